//! Boot verifier committee.

use crate::{Address, HexError};
use std::collections::BTreeSet;

/// The well-known boot verifier addresses.
///
/// Built once at startup and shared read-only (typically behind an `Arc`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootVerifierSet {
    ordered: Vec<Address>,
    members: BTreeSet<Address>,
}

impl BootVerifierSet {
    /// Duplicates are ignored; first occurrence keeps its position.
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut ordered = Vec::new();
        let mut members = BTreeSet::new();
        for address in addresses {
            if members.insert(address) {
                ordered.push(address);
            }
        }
        Self { ordered, members }
    }

    /// Parse a list of hex addresses.
    pub fn from_hex_list<S: AsRef<str>>(list: &[S]) -> Result<Self, HexError> {
        let addresses = list
            .iter()
            .map(|s| Address::from_hex(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(addresses))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Addresses in configuration order.
    pub fn addresses(&self) -> &[Address] {
        &self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AddressType;

    #[test]
    fn test_membership_and_dedup() {
        let a = Address::new(AddressType::Normal, [1; 20]);
        let b = Address::new(AddressType::Normal, [2; 20]);
        let set = BootVerifierSet::new(vec![b, a, b]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.addresses(), &[b, a]);
        assert!(set.contains(&a));
        assert!(!set.contains(&Address::ZERO));
    }

    #[test]
    fn test_from_hex_list() {
        let a = Address::new(AddressType::Normal, [7; 20]);
        let set = BootVerifierSet::from_hex_list(&[a.to_hex()]).unwrap();
        assert!(set.contains(&a));
        assert!(BootVerifierSet::from_hex_list(&["0x12"]).is_err());
    }
}
