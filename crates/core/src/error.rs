//! Error kinds surfaced by the halt-recovery core and its collaborators.

use haltwatch_messages::MsgCode;
use haltwatch_types::{Address, CryptoError, Hash, NodeType, VoteError};
use thiserror::Error;

/// Errors from the chain reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The block is already stored. Saving is idempotent, so callers treat
    /// this as success.
    #[error("already have block {0}")]
    AlreadyHaveBlock(Hash),

    #[error("parent {pre_hash} of block {number} is not the head")]
    NotExtendingHead { number: u64, pre_hash: Hash },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors sending to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("peer {0} disconnected")]
    Disconnected(String),

    #[error("send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },
}

/// Errors from the wallet signer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("wallet is locked")]
    Locked,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("vrf evaluation failed: {0}")]
    Evaluate(String),
}

/// Errors from state or register processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("unknown root {0}")]
    UnknownRoot(Hash),

    #[error("processing failed: {0}")]
    Process(String),
}

/// Protocol-level errors of the halt-recovery core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HaltError {
    #[error("sign error: {0}")]
    SignError(#[source] WalletError),

    #[error("generate proposal config: {0}")]
    GenProposalConfigError(#[source] WalletError),

    #[error("state process error: {0}")]
    StateProcessError(#[source] StateError),

    #[error("proposal msg decode error: {0}")]
    ProposalMsgDecodeError(String),

    #[error("minimal block decode error: {0}")]
    MinimalBlockDecodeError(String),

    #[error("vote msg decode error: {0}")]
    VoteMsgDecodeError(String),

    #[error("height msg decode error: {0}")]
    HeightMsgDecodeError(String),

    #[error("unexpected peer type {node_type} for {peer}")]
    PeerTypeError { peer: String, node_type: NodeType },

    #[error("already have a proposal from {0}")]
    AlreadyHaveVote(Address),

    #[error("proposal height {actual} does not match own proposal height {expected}")]
    HeightMismatch { expected: u64, actual: u64 },

    #[error("vote references {vote_block_id}, proposal block hash is {block_hash}")]
    VoteMsgBlockHashNotMatch { vote_block_id: Hash, block_hash: Hash },

    #[error("alive vote references {vote_block_id}, own proposal is {expected}")]
    AliveVoteBlockHashError { vote_block_id: Hash, expected: Hash },

    #[error("have {have} of {need} proposals")]
    ProposeNotEnough { have: usize, need: usize },

    #[error("timed out waiting for empty block proposals")]
    WaitEmptyBlockExpireError,

    #[error("{0} is not a verifier boot node")]
    AddressIsNotVerifierBootNode(Address),

    #[error("coinbase {coinbase} of proposed block is not its signer {signer}")]
    CoinbaseMismatch { coinbase: Address, signer: Address },

    #[error("proposed block {0} is not an empty block")]
    NotEmptyBlock(Hash),

    #[error("invalid vote: {0}")]
    InvalidVote(#[from] VoteError),

    #[error("no own proposal for this round")]
    NoOwnProposal,

    #[error("save block: {0}")]
    SaveBlock(#[source] ChainError),

    #[error(transparent)]
    PeerSend(#[from] PeerError),

    #[error("message {0} is not handled by this node")]
    UnhandledMessage(MsgCode),
}

impl HaltError {
    /// Errors that describe normal protocol progress rather than a fault.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            HaltError::ProposeNotEnough { .. } | HaltError::AlreadyHaveVote(_)
        )
    }
}
