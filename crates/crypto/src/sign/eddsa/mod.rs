//! Ed25519 key pairs over dcrypt.
//!
//! Secret keys are seed based: deriving a key from the same 32-byte seed
//! always yields the same pair, which is how test networks and genesis
//! signers are provisioned. Signatures are detached and always made over a
//! 32-byte digest, never over raw messages.

use crate::error::CryptoError;
use crate::{Digest, Signature, PUBLIC_KEY_LEN, SEED_LEN};
use dcrypt::api::Signature as SignatureTrait;
use dcrypt::sign::eddsa;
use rand::rngs::OsRng;

/// An Ed25519 signing key with its derived verification key.
#[derive(Clone)]
pub struct SecretKey {
    secret: eddsa::Ed25519SecretKey,
    public: eddsa::Ed25519PublicKey,
}

/// An Ed25519 verification key.
#[derive(Clone)]
pub struct PublicKey(eddsa::Ed25519PublicKey);

impl SecretKey {
    /// Generate a fresh random key pair.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = OsRng;
        let (public, secret) = eddsa::Ed25519::keypair(&mut rng).map_err(CryptoError::from)?;
        Ok(Self { secret, public })
    }

    /// Derive the key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Result<Self, CryptoError> {
        let secret = eddsa::Ed25519SecretKey::from_seed(seed).map_err(|e| {
            CryptoError::InvalidKey(format!("failed to create secret key from seed: {e:?}"))
        })?;
        let public = secret.public_key().map_err(CryptoError::from)?;
        Ok(Self { secret, public })
    }

    /// The verification key for this signing key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public.clone())
    }

    /// Sign a 32-byte digest, returning a detached signature.
    pub fn sign(&self, digest: &Digest) -> Result<Signature, CryptoError> {
        let signature = eddsa::Ed25519::sign(digest.as_slice(), &self.secret)?;
        let bytes = signature.to_bytes();
        let bytes: &[u8] = bytes.as_ref();
        if bytes.len() != 64 {
            return Err(CryptoError::InvalidSignature(format!(
                "unexpected signature length {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 64];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

impl PublicKey {
    /// Parse a verification key from its 32-byte serialization.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        eddsa::Ed25519PublicKey::from_bytes(bytes)
            .map(PublicKey)
            .map_err(|e| CryptoError::InvalidKey(format!("failed to parse public key: {e:?}")))
    }

    /// Serialize the verification key.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let bytes = self.0.to_bytes();
        let bytes: &[u8] = bytes.as_ref();
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(bytes);
        out
    }

    /// Verify a detached signature over a 32-byte digest.
    ///
    /// A malformed or mismatched signature is a `false` return, not an error.
    pub fn verify(&self, signature: &Signature, digest: &Digest) -> bool {
        match eddsa::Ed25519Signature::from_bytes(signature.as_slice()) {
            Ok(sig) => eddsa::Ed25519::verify(digest.as_slice(), &sig, &self.0).is_ok(),
            Err(_) => false,
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests;
