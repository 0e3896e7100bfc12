//! The WASM sandbox of the Meridian engine.
//!
//! Wraps wasmtime behind a deterministic configuration: fuel metering on,
//! threads and SIMD off, a fixed linear-memory ceiling. Modules are compiled
//! once per program hash and cached; every invocation gets a fresh store and
//! instance. Programs see the `wasi_snapshot_preview1` stream/argument
//! surface plus the `env` host calls for state, caller identity and
//! authority checks, all dispatched through an opaque [`HostApi`] handle
//! registered by the execution context.

pub mod error;
pub mod host;
pub mod machine;

pub use error::VmError;
pub use host::{HostApi, FD_STDERR, FD_STDIN, FD_STDOUT};
pub use machine::VirtualMachine;
