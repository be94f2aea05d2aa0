//! Per-round proposal and vote aggregation on a boot verifier.

use crate::{check_proposal_valid, gen_proposal, min_by_hash, ProposalGeneratorConfig};
use haltwatch_core::HaltError;
use haltwatch_messages::ProposalMsg;
use haltwatch_types::{Address, BootVerifierSet, Hash, VoteError, VoteMsg, VoteType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of admitting a peer proposal once every boot verifier has proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    /// Our own proposal is the minimum; we must send it to alive verifiers.
    Selected(ProposalMsg),
    /// Another boot verifier holds the minimum and will emit it.
    Complete { min_hash: Hash },
}

/// Collects proposals and alive-verifier votes for one head height.
///
/// Reused across retries at the same head so that the local proposal, and
/// therefore its hash, stays stable.
pub struct HaltHandler {
    config: ProposalGeneratorConfig,
    boot_verifiers: Arc<BootVerifierSet>,
    own_proposal: Option<ProposalMsg>,
    others: Vec<ProposalMsg>,
    min_proposal: Option<ProposalMsg>,
    /// Keyed by signer, first writer wins.
    alive_votes: BTreeMap<Address, VoteMsg>,
}

impl HaltHandler {
    pub fn new(config: ProposalGeneratorConfig, boot_verifiers: Arc<BootVerifierSet>) -> Self {
        Self {
            config,
            boot_verifiers,
            own_proposal: None,
            others: Vec::new(),
            min_proposal: None,
            alive_votes: BTreeMap::new(),
        }
    }

    /// Build the local proposal. Returns the existing one if already built.
    pub fn propose_empty_block(&mut self) -> Result<ProposalMsg, HaltError> {
        if let Some(own) = &self.own_proposal {
            return Ok(own.clone());
        }
        let proposal = gen_proposal(&self.config)?;
        self.own_proposal = Some(proposal.clone());
        self.min_proposal = Some(proposal.clone());
        Ok(proposal)
    }

    /// Validate a peer proposal and fold it into the running minimum.
    ///
    /// Does not record the proposal; see [`HaltHandler::handle_proposal`].
    pub fn on_new_proposal_msg(&mut self, msg: &ProposalMsg) -> Result<(), HaltError> {
        let own = self.own_proposal.as_ref().ok_or(HaltError::NoOwnProposal)?;
        let signer = msg.signer();
        if signer == own.signer() || self.others.iter().any(|p| p.signer() == signer) {
            return Err(HaltError::AlreadyHaveVote(signer));
        }
        if msg.height() != own.height() {
            return Err(HaltError::HeightMismatch {
                expected: own.height(),
                actual: msg.height(),
            });
        }
        check_proposal_valid(msg, &self.boot_verifiers)?;

        let current = self.min_proposal.as_ref().unwrap_or(own);
        let min = min_by_hash(current, msg).clone();
        self.min_proposal = Some(min);
        Ok(())
    }

    /// Admit a peer proposal.
    ///
    /// Once proposals from all boot verifiers are in, returns
    /// [`ProposalOutcome::Selected`] if the local proposal is the minimum.
    /// Before that, returns [`HaltError::ProposeNotEnough`].
    pub fn handle_proposal(&mut self, msg: ProposalMsg) -> Result<ProposalOutcome, HaltError> {
        self.on_new_proposal_msg(&msg)?;
        debug!(
            from = %msg.signer(),
            hash = %msg.block_hash(),
            "Admitted peer proposal"
        );
        self.others.push(msg);

        match self.selection() {
            Some(outcome) => Ok(outcome),
            None => Err(HaltError::ProposeNotEnough {
                have: self.proposal_count(),
                need: self.expected_boot_count(),
            }),
        }
    }

    /// The round outcome, once proposals from every boot verifier are in.
    ///
    /// A lone boot verifier is complete as soon as it has proposed.
    pub fn selection(&self) -> Option<ProposalOutcome> {
        if self.proposal_count() != self.expected_boot_count() {
            return None;
        }
        let (own, min) = match (&self.own_proposal, &self.min_proposal) {
            (Some(own), Some(min)) => (own, min),
            _ => return None,
        };
        let min_hash = min.block_hash();
        if own.block_hash() == min_hash {
            info!(hash = %min_hash, "Own proposal has the minimal hash");
            Some(ProposalOutcome::Selected(min.clone()))
        } else {
            info!(hash = %min_hash, emitter = %min.signer(), "Minimal hash held by peer");
            Some(ProposalOutcome::Complete { min_hash })
        }
    }

    /// Admit an alive-verifier vote for our own proposal.
    ///
    /// Returns whether the vote was newly recorded; a second vote from the
    /// same signer is ignored.
    pub fn handle_alive_vote(
        &mut self,
        vote: VoteMsg,
        current_verifiers: &[Address],
    ) -> Result<bool, HaltError> {
        if vote.vote_type != VoteType::AliveVerifierVote {
            return Err(VoteError::WrongVoteType(vote.vote_type).into());
        }
        vote.halted_vote_valid(&self.boot_verifiers, current_verifiers)?;

        let own = self.own_proposal.as_ref().ok_or(HaltError::NoOwnProposal)?;
        let expected = own.block_hash();
        if vote.block_id != expected {
            warn!(
                voter = %vote.signer(),
                vote_block = %vote.block_id,
                expected = %expected,
                "Alive vote for a different block"
            );
            return Err(HaltError::AliveVoteBlockHashError {
                vote_block_id: vote.block_id,
                expected,
            });
        }

        let signer = vote.signer();
        if self.alive_votes.contains_key(&signer) {
            return Ok(false);
        }
        self.alive_votes.insert(signer, vote);
        debug!(voter = %signer, votes = self.alive_votes.len(), "Recorded alive vote");
        Ok(true)
    }

    pub fn config(&self) -> &ProposalGeneratorConfig {
        &self.config
    }

    /// Height of the head this handler builds on.
    pub fn cur_block_number(&self) -> u64 {
        self.config.cur_block.number()
    }

    pub fn own_proposal(&self) -> Option<&ProposalMsg> {
        self.own_proposal.as_ref()
    }

    pub fn others(&self) -> &[ProposalMsg] {
        &self.others
    }

    pub fn min_proposal(&self) -> Option<&ProposalMsg> {
        self.min_proposal.as_ref()
    }

    pub fn alive_votes(&self) -> &BTreeMap<Address, VoteMsg> {
        &self.alive_votes
    }

    pub fn votes_len(&self) -> usize {
        self.alive_votes.len()
    }

    /// Own proposal plus admitted peer proposals.
    pub fn proposal_count(&self) -> usize {
        usize::from(self.own_proposal.is_some()) + self.others.len()
    }

    pub fn expected_boot_count(&self) -> usize {
        self.boot_verifiers.len()
    }
}
