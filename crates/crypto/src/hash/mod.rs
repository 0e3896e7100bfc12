//! Cryptographic hash functions.
//!
//! SHA-256 and SHA-512 go through dcrypt, the same backend that provides the
//! signature scheme. Keccak-256, RIPEMD-160 and SHA-1 are utility algorithms
//! served by their RustCrypto implementations.

use crate::error::CryptoError;
use crate::Digest;
use dcrypt::algorithms::hash::sha2::{Sha256 as DcryptSha256, Sha512 as DcryptSha512};
use dcrypt::algorithms::hash::HashFunction as DcryptHashFunction;
use dcrypt::algorithms::ByteSerializable;
use ripemd::Digest as _;

/// SHA-256 of `data`, propagating backend failures.
pub fn try_sha256<T: AsRef<[u8]>>(data: T) -> Result<Digest, CryptoError> {
    let digest = DcryptSha256::digest(data.as_ref()).map_err(dcrypt::Error::from)?;
    digest
        .to_bytes()
        .try_into()
        .map_err(|bytes: Vec<u8>| CryptoError::InvalidHashLength {
            expected: 32,
            got: bytes.len(),
        })
}

/// SHA-512 of `data`, propagating backend failures.
pub fn try_sha512<T: AsRef<[u8]>>(data: T) -> Result<[u8; 64], CryptoError> {
    let digest = DcryptSha512::digest(data.as_ref()).map_err(dcrypt::Error::from)?;
    digest
        .to_bytes()
        .try_into()
        .map_err(|bytes: Vec<u8>| CryptoError::InvalidHashLength {
            expected: 64,
            got: bytes.len(),
        })
}

/// SHA-256 of `data`.
///
/// The backend cannot fail on plain byte input; a failure here is an
/// environment invariant violation and aborts.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> Digest {
    match try_sha256(data) {
        Ok(digest) => digest,
        Err(e) => panic!("sha-256 backend failure: {e}"),
    }
}

/// SHA-512 of `data`.
pub fn sha512<T: AsRef<[u8]>>(data: T) -> [u8; 64] {
    match try_sha512(data) {
        Ok(digest) => digest,
        Err(e) => panic!("sha-512 backend failure: {e}"),
    }
}

/// Keccak-256 of `data` (the pre-NIST padding variant).
pub fn keccak256<T: AsRef<[u8]>>(data: T) -> Digest {
    let mut hasher = sha3::Keccak256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// RIPEMD-160 of `data`.
pub fn ripemd160<T: AsRef<[u8]>>(data: T) -> [u8; 20] {
    let mut hasher = ripemd::Ripemd160::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// SHA-1 of `data`. Legacy algorithm, kept for address compatibility only.
pub fn sha1<T: AsRef<[u8]>>(data: T) -> [u8; 20] {
    let mut hasher = sha1::Sha1::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}
