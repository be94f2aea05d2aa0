//! Empty-block proposal.

use haltwatch_types::{Address, Block, Hash, VoteMsg};
use sbor::prelude::BasicSbor;

/// A boot verifier's empty-block proposal with its own signed vote.
///
/// Sent boot to boot as `ProposeEmptyBlockMsg`, and from the minimal-hash
/// emitter to alive verifiers as `SendMinimalHashBlock`.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ProposalMsg {
    pub round: u64,
    pub empty_block: Block,
    /// `VerBootNodeVote` for `empty_block`, signed by the proposer.
    pub vote_msg: VoteMsg,
}

impl ProposalMsg {
    pub fn new(round: u64, empty_block: Block, vote_msg: VoteMsg) -> Self {
        Self {
            round,
            empty_block,
            vote_msg,
        }
    }

    /// Hash of the proposed block.
    pub fn block_hash(&self) -> Hash {
        self.empty_block.hash()
    }

    /// Height of the proposed block.
    pub fn height(&self) -> u64 {
        self.empty_block.number()
    }

    /// Address claimed by the proposal's vote witness.
    pub fn signer(&self) -> Address {
        self.vote_msg.witness.address
    }

    /// Whether the vote references this proposal's block.
    pub fn vote_matches_block(&self) -> bool {
        self.vote_msg.block_id == self.block_hash()
    }
}
