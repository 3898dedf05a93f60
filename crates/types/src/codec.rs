//! The canonical, deterministic binary codec for all persisted records.
//!
//! Thin wrappers around `parity-scale-codec` (SCALE). Centralizing the codec
//! here keeps every component on the exact same binary representation, so a
//! record written by one version of the store decodes identically everywhere.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical byte representation.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Result<Vec<u8>, String> {
    Ok(v.encode())
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast on trailing bytes or any malformed input.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {}", e))
}
