//! Binary merkle root over hashes.

use crate::Hash;

/// Compute the merkle root of `leaves`.
///
/// Pairs are hashed as `blake3(left || right)`. A level with an odd number of
/// nodes pairs its last node with itself. An empty list has the zero root.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                Hash::from_parts(&[left.as_bytes(), right.as_bytes()])
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash {
        Hash::from_bytes(&[n])
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
        assert_eq!(merkle_root(&[h(1)]), h(1));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let ab = Hash::from_parts(&[h(1).as_bytes(), h(2).as_bytes()]);
        let cc = Hash::from_parts(&[h(3).as_bytes(), h(3).as_bytes()]);
        let expected = Hash::from_parts(&[ab.as_bytes(), cc.as_bytes()]);
        assert_eq!(merkle_root(&[h(1), h(2), h(3)]), expected);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }
}
