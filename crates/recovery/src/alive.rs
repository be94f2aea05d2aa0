//! Alive verifier side of halt recovery.

use crate::{check_proposal_valid, vote_msg};
use haltwatch_core::{HaltError, WalletSigner};
use haltwatch_messages::ProposalMsg;
use haltwatch_types::{BootVerifierSet, VoteMsg, VoteType};
use std::sync::Arc;
use tracing::info;

/// Votes for minimal-hash blocks sent by the emitting boot verifier.
///
/// Holds only the boot committee; every request is answered on its own.
pub struct AliveVerifierHandler {
    boot_verifiers: Arc<BootVerifierSet>,
}

impl AliveVerifierHandler {
    pub fn new(boot_verifiers: Arc<BootVerifierSet>) -> Self {
        Self { boot_verifiers }
    }

    /// Validate `proposal` and sign an alive-verifier vote for its block.
    pub fn on_minimal_hash_block(
        &self,
        proposal: &ProposalMsg,
        wallet: &dyn WalletSigner,
        now_ms: i64,
    ) -> Result<VoteMsg, HaltError> {
        check_proposal_valid(proposal, &self.boot_verifiers)?;
        let vote = vote_msg(
            &proposal.empty_block,
            proposal.round,
            |hash| wallet.sign_hash(hash),
            wallet.address(),
            VoteType::AliveVerifierVote,
            now_ms,
        )?;
        info!(
            height = proposal.height(),
            hash = %proposal.block_hash(),
            emitter = %proposal.signer(),
            "Voting for minimal hash block"
        );
        Ok(vote)
    }
}
