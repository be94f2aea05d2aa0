//! Collaborator traits consumed by the halt-recovery core.

use crate::{ChainError, PeerError, StateError, WalletError};
use haltwatch_messages::MsgCode;
use haltwatch_types::{Address, Block, Hash, NodeType, Signature, VoteMsg};
use std::collections::HashMap;
use std::sync::Arc;

/// Read access to the local chain plus block persistence.
pub trait ChainReader: Send + Sync {
    /// Current head.
    fn current_block(&self) -> Block;

    /// Votes that committed the block at `height`.
    fn get_seen_commit(&self, height: u64) -> Vec<VoteMsg>;

    /// Addresses of the current alive verifier committee.
    fn get_curr_verifiers(&self) -> Vec<Address>;

    /// Persist `block` with `seen_commits` as its verifications.
    ///
    /// Saving a block that is already stored fails with
    /// [`ChainError::AlreadyHaveBlock`].
    fn save_block(&self, block: Block, seen_commits: Vec<VoteMsg>) -> Result<(), ChainError>;

    fn get_block_by_number(&self, number: u64) -> Option<Block>;

    /// Whether `block` starts a new verifier slot.
    fn is_change_point(&self, block: &Block, packaging: bool) -> bool;

    fn get_slot(&self, block: &Block) -> Option<u64>;

    /// Number of the last change point at or before `block`.
    fn get_last_change_point(&self, block: &Block) -> Option<u64>;

    /// A scratch account-state processor rooted at `state_root`.
    fn block_processor(&self, state_root: Hash) -> Result<Box<dyn StateProcessor>, StateError>;

    /// A scratch register processor rooted at `register_root`.
    fn build_register_processor(
        &self,
        register_root: Hash,
    ) -> Result<Box<dyn RegisterProcessor>, StateError>;
}

/// Account-state transition over a scratch copy of the state.
///
/// Implementations must never write to committed storage.
pub trait StateProcessor: Send {
    /// Apply everything a block does except its transactions: rewards and
    /// verifier accounting.
    fn process_except_txs(
        &mut self,
        block: &Block,
        economy: &dyn EconomyModel,
        is_package: bool,
    ) -> Result<(), StateError>;

    /// Root of the processed state.
    fn finalise(&mut self) -> Result<Hash, StateError>;
}

/// Register-state transition over a scratch copy of the register trie.
pub trait RegisterProcessor: Send {
    fn process(&mut self, block: &Block) -> Result<(), StateError>;

    fn finalise(&mut self) -> Result<Hash, StateError>;
}

/// Reward schedule. Only the state processor looks inside it.
pub trait EconomyModel: Send + Sync {
    /// Reward credited to the coinbase of block `number`.
    fn block_reward(&self, number: u64) -> u64;
}

/// The local node's signing identity.
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Uncompressed SEC1 public key.
    fn public_key(&self) -> Vec<u8>;

    fn sign_hash(&self, hash: &Hash) -> Result<Signature, WalletError>;

    /// VRF-style evaluation returning `(index, proof)` for `seed`.
    fn evaluate(&self, account: &Address, seed: &Hash) -> Result<([u8; 32], Vec<u8>), WalletError>;
}

/// A connected remote node.
pub trait Peer: Send + Sync {
    /// Queue a message. Must not block; the transport buffers or fails fast.
    fn send_msg(&self, code: MsgCode, payload: Vec<u8>) -> Result<(), PeerError>;

    fn node_name(&self) -> String;

    fn node_type(&self) -> NodeType;

    fn remote_verifier_address(&self) -> Address;
}

/// Connected peers keyed by node name.
pub type PeerMap = HashMap<String, Arc<dyn Peer>>;

/// Connected peers grouped by role.
pub trait PeerSet: Send + Sync {
    fn boot_peers(&self) -> PeerMap;

    fn current_verifier_peers(&self) -> PeerMap;

    fn next_verifier_peers(&self) -> PeerMap;
}

/// Announce a finalised block to the rest of the network.
pub trait BlockBroadcaster: Send + Sync {
    fn broadcast(&self, block: &Block);
}
