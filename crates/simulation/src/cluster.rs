//! A cluster of simulated nodes running the halt check.

use crate::chain::{SimChain, SimEconomy};
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::transport::{SimBroadcaster, SimPeerSet, SimTransport};
use crate::wallet::SimWallet;
use crate::NodeIndex;
use haltwatch_core::ChainReader;
use haltwatch_production::{Clock, ConfigError, HaltCheckConfig, HaltCheckDeps, SystemHaltedCheck};
use haltwatch_types::{Block, BootVerifierSet, Difficulty, Hash, KeyPair, NodeType, Transaction};
use std::sync::Arc;
use tracing::info;

/// Cluster shape and timing.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub boot_count: usize,
    pub verifier_count: usize,
    pub normal_count: usize,
    /// Height of the shared head every node starts from.
    pub head_height: u64,
    /// Unix milliseconds at simulation start.
    pub start_time_ms: i64,
    pub network: NetworkConfig,
    /// Timing template. Committee fields are filled in by the cluster.
    pub halt: HaltCheckConfig,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            boot_count: 3,
            verifier_count: 4,
            normal_count: 0,
            head_height: 100,
            start_time_ms: 1_700_000_000_000,
            network: NetworkConfig::default(),
            halt: HaltCheckConfig::default(),
            seed: 42,
        }
    }
}

/// One simulated node.
pub struct SimNode {
    pub index: NodeIndex,
    pub name: String,
    pub node_type: NodeType,
    pub key: KeyPair,
    pub chain: Arc<SimChain>,
    pub check: Arc<SystemHaltedCheck>,
}

/// Boot verifiers first, then alive verifiers, then normal nodes.
pub struct HaltCluster {
    nodes: Vec<SimNode>,
    transport: Arc<SimTransport>,
}

impl HaltCluster {
    /// Build every node on a shared head. Must be called inside a tokio
    /// runtime; the cluster clock follows tokio time.
    pub fn new(config: ClusterConfig) -> Result<Self, ConfigError> {
        let roles: Vec<(NodeType, usize)> = [
            (NodeType::VerifierBoot, config.boot_count),
            (NodeType::Verifier, config.verifier_count),
            (NodeType::Normal, config.normal_count),
        ]
        .into_iter()
        .flat_map(|(node_type, count)| (0..count).map(move |i| (node_type, i)))
        .collect();

        let keys: Vec<KeyPair> = roles
            .iter()
            .map(|(node_type, i)| {
                KeyPair::from_seed(format!("{}-{}-{}", config.seed, role_name(*node_type), i).as_bytes())
            })
            .collect();
        let boot_set = Arc::new(BootVerifierSet::new(
            roles
                .iter()
                .zip(&keys)
                .filter(|((node_type, _), _)| *node_type == NodeType::VerifierBoot)
                .map(|(_, key)| key.address()),
        ));
        let verifiers: Vec<_> = roles
            .iter()
            .zip(&keys)
            .filter(|((node_type, _), _)| *node_type == NodeType::Verifier)
            .map(|(_, key)| key.address())
            .collect();

        let halt_config = config
            .halt
            .clone()
            .with_boot_verifiers(boot_set)
            .with_verifier_count(config.verifier_count.max(1));
        let head = initial_head(config.head_height, config.start_time_ms);
        let clock = sim_clock(config.start_time_ms);
        let transport = SimTransport::new(config.network.clone(), roles.len(), config.seed);

        let mut nodes = Vec::with_capacity(roles.len());
        for ((node_type, i), key) in roles.into_iter().zip(keys) {
            let name = format!("{}-{}", role_name(node_type), i);
            let chain = Arc::new(SimChain::new(head.clone(), verifiers.clone()));
            let index = transport.register(name.clone(), node_type, key.address(), chain.clone());

            let deps = HaltCheckDeps::new(
                chain.clone(),
                Arc::new(SimWallet::new(key.clone())),
                Arc::new(SimPeerSet::new(transport.clone(), index)),
                Arc::new(SimBroadcaster::new(transport.clone(), index)),
                Arc::new(SimEconomy { reward: 10 }),
            )
            .with_clock(clock.clone());
            let check = Arc::new(SystemHaltedCheck::new(node_type, halt_config.clone(), deps)?);

            transport.attach(index, &check);
            let listener = Arc::downgrade(&check);
            chain.on_insert(Arc::new(move |number| {
                if let Some(check) = listener.upgrade() {
                    check.on_block_inserted(number);
                }
            }));

            nodes.push(SimNode {
                index,
                name,
                node_type,
                key,
                chain,
                check,
            });
        }

        Ok(Self { nodes, transport })
    }

    pub fn start(&self) {
        for node in &self.nodes {
            node.check.start();
        }
        info!(nodes = self.nodes.len(), "Cluster started");
    }

    /// Stop every node and wait for its tasks.
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.check.stop();
        }
        for node in &self.nodes {
            node.check.join().await;
        }
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> &SimNode {
        &self.nodes[index]
    }

    pub fn nodes_of(&self, node_type: NodeType) -> impl Iterator<Item = &SimNode> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    pub fn transport(&self) -> &Arc<SimTransport> {
        &self.transport
    }

    pub fn with_network<R>(&self, f: impl FnOnce(&mut SimulatedNetwork) -> R) -> R {
        self.transport.with_network(f)
    }

    pub fn heights(&self) -> Vec<u64> {
        self.nodes.iter().map(|n| n.chain.height()).collect()
    }

    /// Build a regular block on node 0's head and insert it on every node
    /// that can accept it, as if the verifiers had produced it.
    pub fn produce_block(&self) -> Block {
        let head = self.nodes[0].chain.current_block();
        let number = head.number() + 1;

        let mut block = Block::genesis(head.header.timestamp + 10_000);
        block.header.number = number;
        block.header.pre_hash = head.hash();
        block.header.seed = Hash::from_parts(&[b"produced", &number.to_be_bytes()]);
        block.header.difficulty = Difficulty::from_bytes([0x20, 0x00, 0xff, 0xff]);
        block.transactions = vec![Transaction::new(number.to_be_bytes().to_vec())];
        block.header.transaction_root = block.compute_transaction_root();

        for node in &self.nodes {
            node.chain.import_block(block.clone(), Vec::new());
        }
        info!(height = number, "Produced regular block");
        block
    }
}

fn role_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::VerifierBoot => "boot",
        NodeType::Verifier => "verifier",
        NodeType::Normal => "normal",
    }
}

/// The head every node starts from.
pub fn initial_head(height: u64, timestamp_ms: i64) -> Block {
    let mut block = Block::genesis(timestamp_ms);
    block.header.number = height;
    block.header.seed = Hash::from_parts(&[b"head-seed", &height.to_be_bytes()]);
    block.header.state_root = Hash::from_parts(&[b"head-state", &height.to_be_bytes()]);
    block.header.register_root = Hash::from_parts(&[b"head-register", &height.to_be_bytes()]);
    block
}

/// A wall clock that starts at `start_ms` and advances with tokio time, so a
/// paused runtime yields reproducible timestamps.
pub fn sim_clock(start_ms: i64) -> Clock {
    let origin = tokio::time::Instant::now();
    Arc::new(move || start_ms + origin.elapsed().as_millis() as i64)
}
