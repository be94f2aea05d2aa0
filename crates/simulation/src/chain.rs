//! In-memory chain with scratch state processors.

use haltwatch_core::{
    ChainError, ChainReader, EconomyModel, RegisterProcessor, StateError, StateProcessor,
};
use haltwatch_types::{Address, Block, Hash, VoteMsg};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Called with the number of every block inserted into a [`SimChain`].
pub type InsertListener = Arc<dyn Fn(u64) + Send + Sync>;

/// A linear in-memory chain.
///
/// Blocks must extend the head. Every insertion, whether saved locally or
/// imported from a peer, is reported to the registered listeners.
pub struct SimChain {
    blocks: RwLock<Vec<Block>>,
    seen_commits: RwLock<HashMap<u64, Vec<VoteMsg>>>,
    verifiers: Vec<Address>,
    listeners: RwLock<Vec<InsertListener>>,
    /// Returned by the next `save_block` instead of saving.
    injected_save_error: Mutex<Option<ChainError>>,
    save_calls: Mutex<usize>,
}

impl SimChain {
    pub fn new(head: Block, verifiers: Vec<Address>) -> Self {
        Self {
            blocks: RwLock::new(vec![head]),
            seen_commits: RwLock::new(HashMap::new()),
            verifiers,
            listeners: RwLock::new(Vec::new()),
            injected_save_error: Mutex::new(None),
            save_calls: Mutex::new(0),
        }
    }

    pub fn on_insert(&self, listener: InsertListener) {
        self.listeners.write().push(listener);
    }

    /// Make the next `save_block` call fail with `error`.
    pub fn inject_save_error(&self, error: ChainError) {
        *self.injected_save_error.lock() = Some(error);
    }

    /// Number of `save_block` calls so far, including failed ones.
    pub fn save_calls(&self) -> usize {
        *self.save_calls.lock()
    }

    pub fn height(&self) -> u64 {
        self.current_block().number()
    }

    /// Every stored block, oldest first.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.read().clone()
    }

    /// Insert a block received from a peer. Blocks that are already stored or
    /// do not extend the head are ignored.
    pub fn import_block(&self, block: Block, seen_commits: Vec<VoteMsg>) -> bool {
        match self.insert(block, seen_commits) {
            Ok(()) => true,
            Err(e) => {
                trace!(error = %e, "Block not imported");
                false
            }
        }
    }

    fn insert(&self, block: Block, seen_commits: Vec<VoteMsg>) -> Result<(), ChainError> {
        let number = block.number();
        {
            let mut blocks = self.blocks.write();
            let hash = block.hash();
            if blocks.iter().any(|b| b.hash() == hash) {
                return Err(ChainError::AlreadyHaveBlock(hash));
            }
            let head = blocks.last().map(Block::hash).unwrap_or(Hash::ZERO);
            if block.header.pre_hash != head {
                return Err(ChainError::NotExtendingHead {
                    number,
                    pre_hash: block.header.pre_hash,
                });
            }
            self.seen_commits.write().insert(number, seen_commits);
            blocks.push(block);
        }
        debug!(height = number, "Block inserted");

        // Listeners run outside the lock; they may read the chain.
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(number);
        }
        Ok(())
    }
}

impl ChainReader for SimChain {
    fn current_block(&self) -> Block {
        self.blocks
            .read()
            .last()
            .cloned()
            .unwrap_or_else(|| Block::genesis(0))
    }

    fn get_seen_commit(&self, height: u64) -> Vec<VoteMsg> {
        self.seen_commits
            .read()
            .get(&height)
            .cloned()
            .unwrap_or_default()
    }

    fn get_curr_verifiers(&self) -> Vec<Address> {
        self.verifiers.clone()
    }

    fn save_block(&self, block: Block, seen_commits: Vec<VoteMsg>) -> Result<(), ChainError> {
        *self.save_calls.lock() += 1;
        if let Some(error) = self.injected_save_error.lock().take() {
            return Err(error);
        }
        self.insert(block, seen_commits)
    }

    fn get_block_by_number(&self, number: u64) -> Option<Block> {
        self.blocks
            .read()
            .iter()
            .find(|b| b.number() == number)
            .cloned()
    }

    fn is_change_point(&self, _block: &Block, _packaging: bool) -> bool {
        false
    }

    fn get_slot(&self, _block: &Block) -> Option<u64> {
        Some(0)
    }

    fn get_last_change_point(&self, _block: &Block) -> Option<u64> {
        Some(0)
    }

    fn block_processor(&self, state_root: Hash) -> Result<Box<dyn StateProcessor>, StateError> {
        Ok(Box::new(SimStateProcessor { root: state_root }))
    }

    fn build_register_processor(
        &self,
        register_root: Hash,
    ) -> Result<Box<dyn RegisterProcessor>, StateError> {
        Ok(Box::new(SimStateProcessor {
            root: register_root,
        }))
    }
}

/// Folds each applied block into a running hash. Applying the same block to
/// the same root always yields the same result.
struct SimStateProcessor {
    root: Hash,
}

impl StateProcessor for SimStateProcessor {
    fn process_except_txs(
        &mut self,
        block: &Block,
        economy: &dyn EconomyModel,
        _is_package: bool,
    ) -> Result<(), StateError> {
        let reward = economy.block_reward(block.number());
        self.root = Hash::from_parts(&[
            self.root.as_bytes(),
            block.header.coinbase.as_bytes(),
            &reward.to_be_bytes(),
        ]);
        Ok(())
    }

    fn finalise(&mut self) -> Result<Hash, StateError> {
        Ok(self.root)
    }
}

impl RegisterProcessor for SimStateProcessor {
    fn process(&mut self, block: &Block) -> Result<(), StateError> {
        self.root = Hash::from_parts(&[self.root.as_bytes(), &block.number().to_be_bytes()]);
        Ok(())
    }

    fn finalise(&mut self) -> Result<Hash, StateError> {
        Ok(self.root)
    }
}

/// A fixed block reward.
pub struct SimEconomy {
    pub reward: u64,
}

impl EconomyModel for SimEconomy {
    fn block_reward(&self, _number: u64) -> u64 {
        self.reward
    }
}
