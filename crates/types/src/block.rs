//! Block, header and transaction types.

use crate::{merkle_root, Address, Difficulty, Hash, VoteMsg};
use sbor::prelude::*;

/// Block header. The block hash depends only on these fields.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockHeader {
    pub version: u32,
    pub number: u64,
    pub seed: Hash,
    pub proof: Vec<u8>,
    /// Uncompressed SEC1 public key of the miner.
    pub miner_pub_key: Vec<u8>,
    pub pre_hash: Hash,
    pub difficulty: Difficulty,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub coinbase: Address,
    pub bloom: Vec<u8>,
    pub transaction_root: Hash,
    pub state_root: Hash,
    pub interlink_root: Hash,
    pub register_root: Hash,
}

impl BlockHeader {
    /// Create a genesis header with everything zeroed except `timestamp`.
    pub fn genesis(timestamp: i64) -> Self {
        Self {
            version: 1,
            number: 0,
            seed: Hash::ZERO,
            proof: Vec::new(),
            miner_pub_key: Vec::new(),
            pre_hash: Hash::ZERO,
            difficulty: Difficulty::ZERO,
            timestamp,
            coinbase: Address::ZERO,
            bloom: Vec::new(),
            transaction_root: Hash::ZERO,
            state_root: Hash::ZERO,
            interlink_root: Hash::ZERO,
            register_root: Hash::ZERO,
        }
    }

    /// Content hash of the header.
    ///
    /// Variable-length fields are length-prefixed so that field boundaries
    /// cannot shift between encodings.
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.version.to_be_bytes());
        hasher.update(&self.number.to_be_bytes());
        hasher.update(self.seed.as_bytes());
        update_prefixed(&mut hasher, &self.proof);
        update_prefixed(&mut hasher, &self.miner_pub_key);
        hasher.update(self.pre_hash.as_bytes());
        hasher.update(self.difficulty.as_bytes());
        hasher.update(&self.timestamp.to_be_bytes());
        hasher.update(self.coinbase.as_bytes());
        update_prefixed(&mut hasher, &self.bloom);
        hasher.update(self.transaction_root.as_bytes());
        hasher.update(self.state_root.as_bytes());
        hasher.update(self.interlink_root.as_bytes());
        hasher.update(self.register_root.as_bytes());
        Hash::from_hash_bytes(*hasher.finalize().as_bytes())
    }
}

fn update_prefixed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Opaque transaction payload. Empty blocks carry none.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Transaction {
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.payload)
    }
}

/// A block with its transactions, seen-commit votes and interlinks.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Commit votes for the parent block. A block's own commit votes are
    /// stored beside it by the chain (see `save_block` / seen commits).
    pub verifications: Vec<VoteMsg>,
    pub interlinks: Vec<Hash>,
}

impl Block {
    pub fn genesis(timestamp: i64) -> Self {
        Self {
            header: BlockHeader::genesis(timestamp),
            transactions: Vec::new(),
            verifications: Vec::new(),
            interlinks: Vec::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// No transactions and the zero difficulty marker.
    pub fn is_empty_block(&self) -> bool {
        self.transactions.is_empty() && self.header.difficulty.is_zero()
    }

    /// Merkle root over the transaction hashes.
    pub fn compute_transaction_root(&self) -> Hash {
        let leaves: Vec<Hash> = self.transactions.iter().map(Transaction::hash).collect();
        merkle_root(&leaves)
    }
}

/// Derive the interlink vector of a new block from its parent's interlinks.
///
/// The parent hash (`header.pre_hash`) occupies every level from 0 up to its
/// own level, where the level is the number of leading zero bits. Higher
/// levels are inherited unchanged.
pub fn derive_interlinks(prev_interlinks: &[Hash], header: &BlockHeader) -> Vec<Hash> {
    let mut interlinks = prev_interlinks.to_vec();
    let level = header.pre_hash.leading_zero_bits() as usize;
    if interlinks.len() < level + 1 {
        interlinks.resize(level + 1, Hash::ZERO);
    }
    for slot in interlinks.iter_mut().take(level + 1) {
        *slot = header.pre_hash;
    }
    interlinks
}
