//! 32-byte hash type.

use sbor::prelude::*;
use std::fmt;
use thiserror::Error;

/// Length of a hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// Errors from parsing hex strings into fixed-size identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Strip an optional `0x` prefix and decode into exactly `N` bytes.
pub(crate) fn decode_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], HexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| HexError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(HexError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Opaque 32-byte identifier.
///
/// Ordering is byte-wise lexicographic, which is what minimum-hash selection
/// relies on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BasicSbor)]
#[sbor(transparent)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// All-zero hash.
    pub const ZERO: Self = Hash([0u8; HASH_LENGTH]);

    /// Hash arbitrary bytes with blake3.
    pub fn from_bytes(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Hash the concatenation of several byte slices.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(*hasher.finalize().as_bytes())
    }

    /// Wrap raw hash bytes without hashing them.
    pub const fn from_hash_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Hash(bytes)
    }

    /// Parse from a hex string (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        decode_fixed_hex::<HASH_LENGTH>(s).map(Hash)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// Number of leading zero bits, used for interlink levels.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0;
        for byte in self.0 {
            if byte == 0 {
                bits += 8;
            } else {
                bits += byte.leading_zeros();
                break;
            }
        }
        bits
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are enough to tell hashes apart in logs.
        write!(f, "Hash({}..)", &hex::encode(self.0)[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_bytewise() {
        let mut low = [0u8; 32];
        let mut high = [0u8; 32];
        low[0] = 0x01;
        high[0] = 0x02;
        low[31] = 0xff;
        assert!(Hash::from_hash_bytes(low) < Hash::from_hash_bytes(high));
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = Hash::from_bytes(b"block");
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(matches!(
            Hash::from_hex("0x1234"),
            Err(HexError::InvalidLength { expected: 32, .. })
        ));
    }

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(Hash::ZERO.leading_zero_bits(), 256);
        let mut bytes = [0u8; 32];
        bytes[1] = 0b0001_0000;
        assert_eq!(Hash::from_hash_bytes(bytes).leading_zero_bits(), 11);
    }
}
