//! Ed25519 signing and verification via dcrypt.

mod eddsa;

pub use eddsa::{PublicKey, SecretKey};
