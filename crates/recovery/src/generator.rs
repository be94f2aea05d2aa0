//! Empty-block proposal generation.

use haltwatch_core::{HaltError, StateError, WalletError};
use haltwatch_messages::ProposalMsg;
use haltwatch_types::{
    address_from_public_key, derive_interlinks, merkle_root, Address, Block, BlockHeader,
    Difficulty, Hash, Signature, VoteMsg, VoteType,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// How far ahead of the local clock a proposal is stamped.
pub const TIMESTAMP_AHEAD_MS: i64 = 3_000;

/// Proposal timestamps are rounded down to this granularity so that boot
/// verifiers with slightly different clocks stamp the same value.
pub const TIMESTAMP_BUCKET_MS: i64 = 10_000;

/// Signs a 32-byte hash with the local wallet.
pub type SignHashFn = Arc<dyn Fn(&Hash) -> Result<Signature, WalletError> + Send + Sync>;

/// Computes `(state_root, register_root)` after applying `block` on top of
/// the given previous roots, without touching committed state.
pub type ProcessStateFn =
    Arc<dyn Fn(&Block, Hash, Hash) -> Result<(Hash, Hash), StateError> + Send + Sync>;

/// Everything needed to build one proposal. Holds no hidden state.
#[derive(Clone)]
pub struct ProposalGeneratorConfig {
    pub cur_block: Block,
    pub new_block_seed: Hash,
    pub new_block_proof: Vec<u8>,
    pub last_verifications: Vec<VoteMsg>,
    /// Uncompressed SEC1 public key of the proposer.
    pub pub_key: Vec<u8>,
    pub sign_hash_fn: SignHashFn,
    pub process_state_fn: ProcessStateFn,
    pub vote_type: VoteType,
    /// Wall clock at config creation, Unix milliseconds.
    pub now_ms: i64,
}

impl fmt::Debug for ProposalGeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProposalGeneratorConfig")
            .field("cur_block", &self.cur_block.number())
            .field("new_block_seed", &self.new_block_seed)
            .field("last_verifications", &self.last_verifications.len())
            .field("vote_type", &self.vote_type)
            .field("now_ms", &self.now_ms)
            .finish_non_exhaustive()
    }
}

/// Timestamp for an empty block built at `now_ms` on a head stamped
/// `cur_timestamp`.
///
/// `now + 3s`, bucketed, and never earlier than one millisecond after the
/// head.
pub fn proposal_timestamp(now_ms: i64, cur_timestamp: i64) -> i64 {
    let ahead = now_ms.saturating_add(TIMESTAMP_AHEAD_MS);
    let bucketed = ahead - ahead.rem_euclid(TIMESTAMP_BUCKET_MS);
    bucketed.max(cur_timestamp.saturating_add(1))
}

/// Build a signed proposal extending `cfg.cur_block`.
///
/// Deterministic in `cfg`: two calls with the same config produce the same
/// block hash.
pub fn gen_proposal(cfg: &ProposalGeneratorConfig) -> Result<ProposalMsg, HaltError> {
    let cur = &cfg.cur_block;
    let coinbase = address_from_public_key(&cfg.pub_key)
        .map_err(|e| HaltError::GenProposalConfigError(WalletError::Crypto(e)))?;

    let header = BlockHeader {
        version: cur.header.version,
        number: cur.number() + 1,
        seed: cfg.new_block_seed,
        proof: cfg.new_block_proof.clone(),
        miner_pub_key: cfg.pub_key.clone(),
        pre_hash: cur.hash(),
        difficulty: Difficulty::ZERO,
        timestamp: proposal_timestamp(cfg.now_ms, cur.header.timestamp),
        coinbase,
        bloom: Vec::new(),
        transaction_root: merkle_root(&[]),
        state_root: Hash::ZERO,
        interlink_root: Hash::ZERO,
        register_root: Hash::ZERO,
    };
    let mut block = Block {
        header,
        transactions: Vec::new(),
        verifications: cfg.last_verifications.clone(),
        interlinks: Vec::new(),
    };

    let (state_root, register_root) = (cfg.process_state_fn)(
        &block,
        cur.header.state_root,
        cur.header.register_root,
    )
    .map_err(HaltError::StateProcessError)?;
    block.header.state_root = state_root;
    block.header.register_root = register_root;

    block.interlinks = derive_interlinks(&cur.interlinks, &block.header);
    block.header.interlink_root = merkle_root(&block.interlinks);

    let round = cfg.last_verifications.first().map_or(0, |v| v.round);
    let vote = vote_msg(
        &block,
        round,
        |hash| (cfg.sign_hash_fn)(hash),
        coinbase,
        cfg.vote_type,
        cfg.now_ms,
    )?;

    info!(
        height = block.number(),
        hash = %block.hash(),
        coinbase = %coinbase,
        "Generated empty block proposal"
    );
    Ok(ProposalMsg::new(round, block, vote))
}

/// Sign a vote of `vote_type` for `block`.
pub fn vote_msg(
    block: &Block,
    round: u64,
    sign: impl FnOnce(&Hash) -> Result<Signature, WalletError>,
    address: Address,
    vote_type: VoteType,
    now_ms: i64,
) -> Result<VoteMsg, HaltError> {
    let vote = VoteMsg::new_signed(
        block.number(),
        round,
        block.hash(),
        vote_type,
        now_ms,
        address,
        sign,
    )
    .map_err(HaltError::SignError)?;
    debug!(height = vote.height, ?vote_type, signer = %address, "Signed vote");
    Ok(vote)
}
