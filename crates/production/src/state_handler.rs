//! Adapter between the halt-recovery core and the node's chain, state and
//! wallet.

use haltwatch_core::{
    ChainError, ChainReader, EconomyModel, HaltError, StateError, WalletSigner,
};
use haltwatch_messages::ProposalMsg;
use haltwatch_recovery::ProposalGeneratorConfig;
use haltwatch_types::{Block, Hash, VoteMsg, VoteType};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Wall clock in Unix milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The system wall clock.
pub fn system_clock() -> Clock {
    Arc::new(unix_now_ms)
}

fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Builds proposal configs, recomputes empty-block roots, and persists
/// finalised empty blocks.
#[derive(Clone)]
pub struct StateHandler {
    chain: Arc<dyn ChainReader>,
    wallet: Arc<dyn WalletSigner>,
    economy: Arc<dyn EconomyModel>,
    clock: Clock,
}

impl StateHandler {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        wallet: Arc<dyn WalletSigner>,
        economy: Arc<dyn EconomyModel>,
    ) -> Self {
        Self {
            chain,
            wallet,
            economy,
            clock: system_clock(),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    /// Snapshot everything needed to build a proposal on the current head.
    pub fn gen_proposal_config(
        &self,
        vote_type: VoteType,
    ) -> Result<ProposalGeneratorConfig, HaltError> {
        let cur_block = self.chain.current_block();
        let account = self.wallet.address();
        let (index, proof) = self
            .wallet
            .evaluate(&account, &cur_block.header.seed)
            .map_err(HaltError::GenProposalConfigError)?;
        let last_verifications = self.chain.get_seen_commit(cur_block.number());

        debug!(
            height = cur_block.number(),
            seen_commits = last_verifications.len(),
            "Generated proposal config"
        );

        let wallet = self.wallet.clone();
        let chain = self.chain.clone();
        let economy = self.economy.clone();
        Ok(ProposalGeneratorConfig {
            cur_block,
            new_block_seed: Hash::from_hash_bytes(index),
            new_block_proof: proof,
            last_verifications,
            pub_key: self.wallet.public_key(),
            sign_hash_fn: Arc::new(move |hash| wallet.sign_hash(hash)),
            process_state_fn: Arc::new(move |block, state_root, register_root| {
                process_account_and_register_state(
                    chain.as_ref(),
                    economy.as_ref(),
                    block,
                    state_root,
                    register_root,
                )
            }),
            vote_type,
            now_ms: self.now_ms(),
        })
    }

    /// Roots of `block` applied on top of the given previous roots.
    pub fn process_account_and_register_state(
        &self,
        block: &Block,
        pre_state_root: Hash,
        pre_register_root: Hash,
    ) -> Result<(Hash, Hash), HaltError> {
        process_account_and_register_state(
            self.chain.as_ref(),
            self.economy.as_ref(),
            block,
            pre_state_root,
            pre_register_root,
        )
        .map_err(HaltError::StateProcessError)
    }

    /// Persist a finalised empty block.
    ///
    /// The proposer's boot vote followed by the alive votes become the
    /// block's seen commits. Saving a block that is already stored succeeds.
    pub fn save_final_empty_block(
        &self,
        proposal: &ProposalMsg,
        alive_votes: impl IntoIterator<Item = VoteMsg>,
    ) -> Result<(), HaltError> {
        let mut verifications = vec![proposal.vote_msg.clone()];
        verifications.extend(alive_votes);
        let votes = verifications.len();

        match self.chain.save_block(proposal.empty_block.clone(), verifications) {
            Ok(()) => {
                info!(
                    height = proposal.height(),
                    hash = %proposal.block_hash(),
                    votes,
                    "Saved final empty block"
                );
                Ok(())
            }
            Err(ChainError::AlreadyHaveBlock(hash)) => {
                debug!(%hash, "Empty block already saved");
                Ok(())
            }
            Err(e) => Err(HaltError::SaveBlock(e)),
        }
    }
}

/// Scratch state transition for an empty block. Never writes committed
/// state.
fn process_account_and_register_state(
    chain: &dyn ChainReader,
    economy: &dyn EconomyModel,
    block: &Block,
    pre_state_root: Hash,
    pre_register_root: Hash,
) -> Result<(Hash, Hash), StateError> {
    let mut state = chain.block_processor(pre_state_root)?;
    state.process_except_txs(block, economy, false)?;
    let state_root = state.finalise()?;

    let mut register = chain.build_register_processor(pre_register_root)?;
    register.process(block)?;
    let register_root = register.finalise()?;

    Ok((state_root, register_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FlatEconomy, MockChain, MockWallet};
    use haltwatch_core::WalletError;
    use haltwatch_recovery::gen_proposal;
    use haltwatch_types::test_utils::{test_head, test_key};
    use haltwatch_types::{Address, Signature};

    fn handler(chain: Arc<MockChain>, label: &str) -> StateHandler {
        StateHandler::new(
            chain,
            Arc::new(MockWallet(test_key(label))),
            Arc::new(FlatEconomy),
        )
        .with_clock(Arc::new(|| 1_000_000))
    }

    #[test]
    fn test_gen_proposal_config_reads_head_and_commits() {
        let head = test_head(100, 900_000);
        let chain = Arc::new(MockChain::new(head.clone(), vec![]));
        let state = handler(chain.clone(), "boot-0");
        let commit = VoteMsg::new_signed(
            100,
            2,
            head.hash(),
            VoteType::Vote,
            0,
            test_key("v").address(),
            |h| test_key("v").sign_hash(h),
        )
        .unwrap();
        chain.seen_commits.lock().insert(100, vec![commit.clone()]);

        let cfg = state.gen_proposal_config(VoteType::VerBootNodeVote).unwrap();
        assert_eq!(cfg.cur_block, head);
        assert_eq!(cfg.last_verifications, vec![commit]);
        assert_eq!(cfg.pub_key, test_key("boot-0").public_key());
        assert_eq!(cfg.now_ms, 1_000_000);

        let proposal = gen_proposal(&cfg).unwrap();
        assert_eq!(proposal.round, 2);
        // The roots come from the chain's scratch processors.
        let (state_root, register_root) = state
            .process_account_and_register_state(
                &proposal.empty_block,
                head.header.state_root,
                head.header.register_root,
            )
            .unwrap();
        assert_eq!(proposal.empty_block.header.state_root, state_root);
        assert_eq!(proposal.empty_block.header.register_root, register_root);
        // Committed state is untouched.
        assert_eq!(chain.current_block(), head);
    }

    #[test]
    fn test_evaluate_failure() {
        struct LockedWallet;

        impl WalletSigner for LockedWallet {
            fn address(&self) -> Address {
                Address::ZERO
            }

            fn public_key(&self) -> Vec<u8> {
                Vec::new()
            }

            fn sign_hash(&self, _: &Hash) -> Result<Signature, WalletError> {
                Err(WalletError::Locked)
            }

            fn evaluate(&self, _: &Address, _: &Hash) -> Result<([u8; 32], Vec<u8>), WalletError> {
                Err(WalletError::Locked)
            }
        }

        let chain = Arc::new(MockChain::new(test_head(1, 0), vec![]));
        let state = StateHandler::new(chain, Arc::new(LockedWallet), Arc::new(FlatEconomy));
        assert_eq!(
            state
                .gen_proposal_config(VoteType::VerBootNodeVote)
                .unwrap_err(),
            HaltError::GenProposalConfigError(WalletError::Locked)
        );
    }

    #[test]
    fn test_save_final_empty_block_is_idempotent() {
        let head = test_head(100, 0);
        let chain = Arc::new(MockChain::new(head, vec![]));
        let state = handler(chain.clone(), "boot-0");
        let proposal = gen_proposal(&state.gen_proposal_config(VoteType::VerBootNodeVote).unwrap())
            .unwrap();

        state.save_final_empty_block(&proposal, vec![]).unwrap();
        state.save_final_empty_block(&proposal, vec![]).unwrap();

        assert_eq!(chain.current_block().hash(), proposal.block_hash());
        assert_eq!(
            chain.get_seen_commit(101),
            vec![proposal.vote_msg.clone()]
        );
    }

    #[test]
    fn test_save_failure_propagates() {
        let chain = Arc::new(MockChain::new(test_head(100, 0), vec![]));
        let state = handler(chain.clone(), "boot-0");
        let proposal = gen_proposal(&state.gen_proposal_config(VoteType::VerBootNodeVote).unwrap())
            .unwrap();
        *chain.save_error.lock() = Some(ChainError::Storage("disk full".into()));

        assert_eq!(
            state.save_final_empty_block(&proposal, vec![]),
            Err(HaltError::SaveBlock(ChainError::Storage("disk full".into())))
        );
    }
}
