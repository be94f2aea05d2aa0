//! Core types for haltwatch verifier-halt recovery.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Primitives**: Hash, Address, Difficulty, recoverable signatures
//! - **Chain types**: Block, BlockHeader, Transaction, interlinks
//! - **Votes**: VoteMsg, VoteType, Witness and the halt-recovery validity rule
//! - **Committee**: BootVerifierSet, NodeType
//!
//! It does not depend on any other workspace crate.

mod block;
mod crypto;
mod difficulty;
mod hash;
mod identifiers;
mod merkle;
mod topology;
mod vote;

pub use block::{derive_interlinks, Block, BlockHeader, Transaction};
pub use crypto::{
    address_from_public_key, recover_address, CryptoError, KeyPair, PublicKeyBytes, Signature,
    SIGNATURE_LENGTH,
};
pub use difficulty::Difficulty;
pub use hash::{Hash, HexError, HASH_LENGTH};
pub use identifiers::{Address, AddressType, NodeType, ADDRESS_LENGTH};
pub use merkle::merkle_root;
pub use topology::BootVerifierSet;
pub use vote::{VoteError, VoteMsg, VoteType, Witness};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Deterministic key pair from a short label.
    pub fn test_key(label: &str) -> KeyPair {
        KeyPair::from_seed(label.as_bytes())
    }

    /// A chain head at `number` with distinctive roots and no votes.
    pub fn test_head(number: u64, timestamp: i64) -> Block {
        let mut block = Block::genesis(timestamp);
        block.header.number = number;
        block.header.seed = Hash::from_parts(&[b"seed", &number.to_be_bytes()]);
        block.header.pre_hash = Hash::from_parts(&[b"parent", &number.to_be_bytes()]);
        block.header.state_root = Hash::from_parts(&[b"state", &number.to_be_bytes()]);
        block.header.register_root = Hash::from_parts(&[b"register", &number.to_be_bytes()]);
        block
    }
}
