//! Proposal validity and minimum-hash selection.

use haltwatch_core::HaltError;
use haltwatch_messages::ProposalMsg;
use haltwatch_types::{address_from_public_key, BootVerifierSet, VoteError, VoteType};
use std::cmp::Ordering;

/// Check a peer proposal before it is admitted or voted on.
///
/// The vote must reference the proposed block, be a boot vote whose
/// signature recovers to a boot verifier, and the block must be an empty
/// block mined by that same signer.
pub fn check_proposal_valid(
    msg: &ProposalMsg,
    boot_verifiers: &BootVerifierSet,
) -> Result<(), HaltError> {
    let block_hash = msg.block_hash();
    if msg.vote_msg.block_id != block_hash {
        return Err(HaltError::VoteMsgBlockHashNotMatch {
            vote_block_id: msg.vote_msg.block_id,
            block_hash,
        });
    }
    if msg.vote_msg.vote_type != VoteType::VerBootNodeVote {
        return Err(VoteError::WrongVoteType(msg.vote_msg.vote_type).into());
    }
    let signer = match msg.vote_msg.halted_vote_valid(boot_verifiers, &[]) {
        Ok(()) => msg.signer(),
        Err(VoteError::NotBootVerifier(address)) => {
            return Err(HaltError::AddressIsNotVerifierBootNode(address))
        }
        Err(e) => return Err(e.into()),
    };
    if !msg.empty_block.is_empty_block() {
        return Err(HaltError::NotEmptyBlock(block_hash));
    }
    let header = &msg.empty_block.header;
    let miner = address_from_public_key(&header.miner_pub_key).ok();
    if header.coinbase != signer || miner != Some(signer) {
        return Err(HaltError::CoinbaseMismatch {
            coinbase: header.coinbase,
            signer,
        });
    }
    Ok(())
}

/// The proposal with the lexicographically smaller block hash.
///
/// # Panics
///
/// On equal hashes. Admitted proposals have distinct coinbases, so equality
/// means a hash collision or a broken validity check.
pub fn min_by_hash<'a>(a: &'a ProposalMsg, b: &'a ProposalMsg) -> &'a ProposalMsg {
    let (ha, hb) = (a.block_hash(), b.block_hash());
    match ha.cmp(&hb) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => panic!(
            "equal empty block hashes {ha} from {} and {}",
            a.signer(),
            b.signer()
        ),
    }
}
