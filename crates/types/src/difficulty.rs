//! Compact 4-byte difficulty encoding.

use crate::Hash;
use sbor::prelude::*;
use std::fmt;

/// Compact target: byte 0 is the exponent (byte length of the target),
/// bytes 1..4 are the most significant bytes of the target.
///
/// An all-zero difficulty marks an empty block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, BasicSbor)]
#[sbor(transparent)]
pub struct Difficulty([u8; 4]);

impl Difficulty {
    pub const ZERO: Self = Difficulty([0u8; 4]);

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Difficulty(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 4]
    }

    /// Expand into a 32-byte target. `None` when the exponent is out of range.
    pub fn to_target(&self) -> Option<Hash> {
        let exponent = self.0[0] as usize;
        if !(3..=32).contains(&exponent) {
            return None;
        }
        let mut target = [0u8; 32];
        let start = 32 - exponent;
        target[start..start + 3].copy_from_slice(&self.0[1..4]);
        Some(Hash::from_hash_bytes(target))
    }

    /// Whether `hash` is at or below the target.
    pub fn is_met_by(&self, hash: &Hash) -> bool {
        match self.to_target() {
            Some(target) => hash <= &target,
            None => false,
        }
    }
}

impl fmt::Debug for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Difficulty(0x{})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_has_no_target() {
        assert!(Difficulty::ZERO.is_zero());
        assert_eq!(Difficulty::ZERO.to_target(), None);
        assert!(!Difficulty::ZERO.is_met_by(&Hash::ZERO));
    }

    #[test]
    fn test_target_expansion() {
        let d = Difficulty::from_bytes([0x20, 0x0f, 0xff, 0xff]);
        let target = d.to_target().unwrap();
        assert_eq!(target.as_bytes()[0..3], [0x0f, 0xff, 0xff]);
        assert!(target.as_bytes()[3..].iter().all(|b| *b == 0));

        let d = Difficulty::from_bytes([0x03, 0x01, 0x02, 0x03]);
        assert_eq!(d.to_target().unwrap().as_bytes()[29..], [0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_out_of_range_exponent() {
        assert_eq!(Difficulty::from_bytes([0x21, 1, 1, 1]).to_target(), None);
        assert_eq!(Difficulty::from_bytes([0x02, 1, 1, 1]).to_target(), None);
    }

    #[test]
    fn test_is_met_by() {
        let d = Difficulty::from_bytes([0x20, 0x0f, 0xff, 0xff]);
        let mut easy = [0u8; 32];
        easy[0] = 0x01;
        assert!(d.is_met_by(&Hash::from_hash_bytes(easy)));
        let mut hard = [0u8; 32];
        hard[0] = 0x10;
        assert!(!d.is_met_by(&Hash::from_hash_bytes(hard)));
    }
}
