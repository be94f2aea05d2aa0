//! Verifier-halt recovery protocol logic.
//!
//! This crate holds the synchronous, I/O-free part of halt recovery. It is
//! driven by the production orchestrator and by simulation tests alike.
//!
//! # Round structure
//!
//! When the alive verifier committee stops producing blocks, every boot
//! verifier runs one proposal round:
//!
//! 1. [`gen_proposal`] builds a deterministic empty block extending the head,
//!    recomputes its state and register roots, and signs a boot vote for it.
//! 2. [`HaltHandler`] collects one proposal from every boot verifier and keeps
//!    the one with the smallest block hash.
//! 3. The boot verifier whose own proposal is the minimum sends it to the
//!    alive verifiers, who answer through [`AliveVerifierHandler`].
//! 4. [`HaltHandler::handle_alive_vote`] aggregates their votes until the
//!    orchestrator's wait expires and finalises the block.
//!
//! # Terminology
//!
//! - **Boot verifier**: member of the small, well-known committee allowed to
//!   propose empty blocks during a halt.
//!
//! - **Alive verifier**: member of the current block-producing committee.
//!
//! - **Empty block**: no transactions, zero difficulty. It is committed by
//!   the proposer's boot vote followed by the alive-verifier votes, which the
//!   chain stores as the block's seen commits.
//!
//! # Tie-breaking
//!
//! Proposals are totally ordered by block hash. A proposal's coinbase must be
//! the address of its signer, and at most one proposal per signer is admitted,
//! so two admitted proposals always differ in their headers. Equal hashes can
//! then only come from a hash collision and abort the process.

mod alive;
mod generator;
mod handler;
mod validity;

pub use alive::AliveVerifierHandler;
pub use generator::{
    gen_proposal, proposal_timestamp, vote_msg, ProcessStateFn, ProposalGeneratorConfig,
    SignHashFn, TIMESTAMP_AHEAD_MS, TIMESTAMP_BUCKET_MS,
};
pub use handler::{HaltHandler, ProposalOutcome};
pub use validity::{check_proposal_valid, min_by_hash};

#[cfg(test)]
pub(crate) mod test_support;
