//! Core protocol types for the Meridian engine.
//!
//! Everything that crosses a consensus boundary lives here: accounts, blocks,
//! transactions, operations, receipts, the canonical codec that serializes
//! them, and the error taxonomy shared by every layer of the engine.

pub mod codec;
pub mod error;
pub mod protocol;

pub use error::{ControllerError, Error, ErrorCode, Reversion};
pub use meridian_crypto::{Digest, Signature};
