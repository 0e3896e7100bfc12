use thiserror::Error;

/// Errors raised by the cryptographic primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key could not be parsed or derived.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A signature could not be parsed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// A digest did not have the expected length.
    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidHashLength { expected: usize, got: usize },
    /// The underlying crypto backend failed.
    #[error("crypto backend error: {0}")]
    Backend(String),
}

impl From<dcrypt::Error> for CryptoError {
    fn from(e: dcrypt::Error) -> Self {
        CryptoError::Backend(e.to_string())
    }
}
