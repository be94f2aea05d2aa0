//! Votes and witnesses.

use crate::{recover_address, Address, BootVerifierSet, CryptoError, Hash, Signature};
use sbor::prelude::*;
use thiserror::Error;

/// Kind of vote.
///
/// `Prevote` and `Vote` belong to the normal consensus path and are never
/// valid during halt recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub enum VoteType {
    Prevote,
    Vote,
    /// Cast by a boot verifier for its own empty-block proposal.
    VerBootNodeVote,
    /// Cast by an alive verifier for the minimal-hash empty block.
    AliveVerifierVote,
}

impl VoteType {
    fn tag(self) -> u8 {
        match self {
            VoteType::Prevote => 0,
            VoteType::Vote => 1,
            VoteType::VerBootNodeVote => 2,
            VoteType::AliveVerifierVote => 3,
        }
    }
}

/// Signer identity attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Witness {
    pub address: Address,
    pub signature: Signature,
}

/// Reasons a halt-recovery vote is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("vote type {0:?} is not valid during halt recovery")]
    WrongVoteType(VoteType),

    #[error("signature recovers to {recovered}, witness claims {claimed}")]
    SignerMismatch { claimed: Address, recovered: Address },

    #[error("signature recovery failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("{0} is not a boot verifier")]
    NotBootVerifier(Address),

    #[error("{0} is not a current verifier")]
    NotCurrentVerifier(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct VoteMsg {
    pub height: u64,
    pub round: u64,
    pub block_id: Hash,
    pub vote_type: VoteType,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub witness: Witness,
}

impl VoteMsg {
    /// Build and sign a vote. `sign` is called with [`VoteMsg::signing_hash`].
    pub fn new_signed<E>(
        height: u64,
        round: u64,
        block_id: Hash,
        vote_type: VoteType,
        timestamp: i64,
        address: Address,
        sign: impl FnOnce(&Hash) -> Result<Signature, E>,
    ) -> Result<Self, E> {
        let mut vote = Self {
            height,
            round,
            block_id,
            vote_type,
            timestamp,
            witness: Witness {
                address,
                signature: Signature::default(),
            },
        };
        vote.witness.signature = sign(&vote.signing_hash())?;
        Ok(vote)
    }

    /// Hash over every field except the signature.
    pub fn signing_hash(&self) -> Hash {
        Hash::from_parts(&[
            &self.height.to_be_bytes(),
            &self.round.to_be_bytes(),
            self.block_id.as_bytes(),
            &[self.vote_type.tag()],
            &self.timestamp.to_be_bytes(),
            self.witness.address.as_bytes(),
        ])
    }

    pub fn signer(&self) -> Address {
        self.witness.address
    }

    /// Recover the signer and check it matches the witness address.
    pub fn verify_signer(&self) -> Result<Address, VoteError> {
        let recovered = recover_address(&self.signing_hash(), &self.witness.signature)?;
        if recovered != self.witness.address {
            return Err(VoteError::SignerMismatch {
                claimed: self.witness.address,
                recovered,
            });
        }
        Ok(recovered)
    }

    /// Validity of a vote cast during halt recovery.
    ///
    /// Normal-path vote types are rejected. A boot vote must come from a
    /// boot verifier, an alive vote from a member of `current_verifiers`.
    pub fn halted_vote_valid(
        &self,
        boot_verifiers: &BootVerifierSet,
        current_verifiers: &[Address],
    ) -> Result<(), VoteError> {
        match self.vote_type {
            VoteType::Prevote | VoteType::Vote => {
                return Err(VoteError::WrongVoteType(self.vote_type))
            }
            VoteType::VerBootNodeVote | VoteType::AliveVerifierVote => {}
        }
        let signer = self.verify_signer()?;
        match self.vote_type {
            VoteType::VerBootNodeVote if !boot_verifiers.contains(&signer) => {
                Err(VoteError::NotBootVerifier(signer))
            }
            VoteType::AliveVerifierVote if !current_verifiers.contains(&signer) => {
                Err(VoteError::NotCurrentVerifier(signer))
            }
            _ => Ok(()),
        }
    }
}
