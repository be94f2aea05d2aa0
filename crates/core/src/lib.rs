//! Contracts between the halt-recovery core and the surrounding node.
//!
//! The recovery logic never touches storage, keys or sockets directly. It
//! consumes the node through a handful of narrow traits:
//!
//! - [`ChainReader`]: head, seen commits, verifier set, block persistence
//! - [`StateProcessor`] / [`RegisterProcessor`]: scratch root computation
//! - [`WalletSigner`]: signing and VRF evaluation
//! - [`PeerSet`] / [`Peer`]: connected peers by role
//! - [`BlockBroadcaster`]: announcing a finalised block
//!
//! Errors from those collaborators and from the protocol itself live in
//! [`error`].

mod error;
mod traits;

pub use error::{ChainError, HaltError, PeerError, StateError, WalletError};
pub use traits::{
    BlockBroadcaster, ChainReader, EconomyModel, Peer, PeerMap, PeerSet, RegisterProcessor,
    StateProcessor, WalletSigner,
};

/// One-shot timers driven by the halt-check loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Halt detection, reset on every inserted block.
    VerifierHalt,
    /// Deadline for collecting every boot verifier's proposal.
    WaitProposalResponse,
    /// Back-off before re-proposing after a failed round.
    ProposalRetry,
    /// Deadline for collecting alive-verifier votes.
    WaitVerifierVote,
}
