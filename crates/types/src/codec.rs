//! The canonical, deterministic binary codec for all consensus-critical data.
//!
//! Thin wrappers around `parity-scale-codec` (SCALE). Centralizing the codec
//! here guarantees every component serializes ids, signatures and state
//! values with the exact same byte layout; a divergent representation of the
//! same data is a consensus failure.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encode a value into its canonical byte representation.
///
/// Use this for anything that is hashed, signed, or written to state.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decode a value from its canonical byte representation.
///
/// Fails fast on trailing bytes or any malformed input; partial decodes are
/// never accepted in a consensus context.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {e}"))
}
