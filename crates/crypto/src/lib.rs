//! Cryptographic primitives for the Meridian engine.
//!
//! Everything consensus-critical funnels through this crate: SHA-256 digests,
//! Ed25519 signatures and the binary Merkle tree used for state roots.

pub mod error;
pub mod hash;
pub mod merkle;
pub mod sign;

pub use error::CryptoError;
pub use hash::{keccak256, ripemd160, sha1, sha256, sha512};
pub use merkle::{merkle_root, MerkleTree};
pub use sign::{PublicKey, SecretKey};

/// A 32-byte SHA-256 digest.
pub type Digest = [u8; 32];

/// A 64-byte Ed25519 detached signature.
pub type Signature = [u8; 64];

/// Length of a serialized Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an Ed25519 seed.
pub const SEED_LEN: usize = 32;
