//! In-memory collaborators for unit tests.

use haltwatch_core::{
    BlockBroadcaster, ChainError, ChainReader, EconomyModel, Peer, PeerError, PeerMap, PeerSet,
    RegisterProcessor, StateError, StateProcessor, WalletError, WalletSigner,
};
use haltwatch_messages::MsgCode;
use haltwatch_types::{Address, Block, Hash, KeyPair, NodeType, Signature, VoteMsg};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MockChain {
    pub blocks: Mutex<Vec<Block>>,
    pub seen_commits: Mutex<HashMap<u64, Vec<VoteMsg>>>,
    pub verifiers: Vec<Address>,
    pub save_error: Mutex<Option<ChainError>>,
}

impl MockChain {
    pub fn new(head: Block, verifiers: Vec<Address>) -> Self {
        Self {
            blocks: Mutex::new(vec![head]),
            seen_commits: Mutex::new(HashMap::new()),
            verifiers,
            save_error: Mutex::new(None),
        }
    }
}

impl ChainReader for MockChain {
    fn current_block(&self) -> Block {
        self.blocks.lock().last().cloned().unwrap_or_else(|| Block::genesis(0))
    }

    fn get_seen_commit(&self, height: u64) -> Vec<VoteMsg> {
        self.seen_commits.lock().get(&height).cloned().unwrap_or_default()
    }

    fn get_curr_verifiers(&self) -> Vec<Address> {
        self.verifiers.clone()
    }

    fn save_block(&self, block: Block, seen_commits: Vec<VoteMsg>) -> Result<(), ChainError> {
        if let Some(err) = self.save_error.lock().clone() {
            return Err(err);
        }
        let mut blocks = self.blocks.lock();
        if blocks.iter().any(|b| b.hash() == block.hash()) {
            return Err(ChainError::AlreadyHaveBlock(block.hash()));
        }
        self.seen_commits.lock().insert(block.number(), seen_commits);
        blocks.push(block);
        Ok(())
    }

    fn get_block_by_number(&self, number: u64) -> Option<Block> {
        self.blocks.lock().iter().find(|b| b.number() == number).cloned()
    }

    fn is_change_point(&self, _: &Block, _: bool) -> bool {
        false
    }

    fn get_slot(&self, _: &Block) -> Option<u64> {
        Some(0)
    }

    fn get_last_change_point(&self, _: &Block) -> Option<u64> {
        Some(0)
    }

    fn block_processor(&self, state_root: Hash) -> Result<Box<dyn StateProcessor>, StateError> {
        Ok(Box::new(HashingProcessor { root: state_root }))
    }

    fn build_register_processor(
        &self,
        register_root: Hash,
    ) -> Result<Box<dyn RegisterProcessor>, StateError> {
        Ok(Box::new(HashingProcessor {
            root: register_root,
        }))
    }
}

/// Folds the block number and coinbase into the root.
struct HashingProcessor {
    root: Hash,
}

impl StateProcessor for HashingProcessor {
    fn process_except_txs(
        &mut self,
        block: &Block,
        economy: &dyn EconomyModel,
        _is_package: bool,
    ) -> Result<(), StateError> {
        let reward = economy.block_reward(block.number()).to_be_bytes();
        self.root = Hash::from_parts(&[
            self.root.as_bytes(),
            block.header.coinbase.as_bytes(),
            &reward,
        ]);
        Ok(())
    }

    fn finalise(&mut self) -> Result<Hash, StateError> {
        Ok(self.root)
    }
}

impl RegisterProcessor for HashingProcessor {
    fn process(&mut self, block: &Block) -> Result<(), StateError> {
        self.root = Hash::from_parts(&[self.root.as_bytes(), &block.number().to_be_bytes()]);
        Ok(())
    }

    fn finalise(&mut self) -> Result<Hash, StateError> {
        Ok(self.root)
    }
}

pub struct FlatEconomy;

impl EconomyModel for FlatEconomy {
    fn block_reward(&self, _: u64) -> u64 {
        10
    }
}

pub struct MockWallet(pub KeyPair);

impl WalletSigner for MockWallet {
    fn address(&self) -> Address {
        self.0.address()
    }

    fn public_key(&self) -> Vec<u8> {
        self.0.public_key()
    }

    fn sign_hash(&self, hash: &Hash) -> Result<Signature, WalletError> {
        Ok(self.0.sign_hash(hash)?)
    }

    fn evaluate(&self, account: &Address, seed: &Hash) -> Result<([u8; 32], Vec<u8>), WalletError> {
        let proof = self.0.sign_hash(&Hash::from_parts(&[seed.as_bytes(), account.as_bytes()]))?;
        let index = Hash::from_bytes(proof.as_bytes());
        Ok((*index.as_bytes(), proof.as_bytes().to_vec()))
    }
}

pub struct MockPeer {
    pub name: String,
    pub node_type: NodeType,
    pub address: Address,
    pub sent: Mutex<Vec<(MsgCode, Vec<u8>)>>,
    pub fail: bool,
}

impl MockPeer {
    pub fn new(name: &str, node_type: NodeType, address: Address) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            node_type,
            address,
            sent: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn sent_codes(&self) -> Vec<MsgCode> {
        self.sent.lock().iter().map(|(code, _)| *code).collect()
    }
}

impl Peer for MockPeer {
    fn send_msg(&self, code: MsgCode, payload: Vec<u8>) -> Result<(), PeerError> {
        if self.fail {
            return Err(PeerError::Disconnected(self.name.clone()));
        }
        self.sent.lock().push((code, payload));
        Ok(())
    }

    fn node_name(&self) -> String {
        self.name.clone()
    }

    fn node_type(&self) -> NodeType {
        self.node_type
    }

    fn remote_verifier_address(&self) -> Address {
        self.address
    }
}

#[derive(Default)]
pub struct MockPeers {
    pub boot: Mutex<PeerMap>,
    pub current: Mutex<PeerMap>,
    pub next: Mutex<PeerMap>,
}

impl PeerSet for MockPeers {
    fn boot_peers(&self) -> PeerMap {
        self.boot.lock().clone()
    }

    fn current_verifier_peers(&self) -> PeerMap {
        self.current.lock().clone()
    }

    fn next_verifier_peers(&self) -> PeerMap {
        self.next.lock().clone()
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    pub blocks: Mutex<Vec<Block>>,
}

impl BlockBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, block: &Block) {
        self.blocks.lock().push(block.clone());
    }
}
