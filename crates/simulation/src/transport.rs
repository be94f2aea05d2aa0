//! Message transport between simulated nodes.
//!
//! Every send goes through the [`SimulatedNetwork`] for a delivery decision
//! and is then delivered by a tokio task after the sampled latency, so runs
//! under a paused tokio clock are reproducible for a given seed.

use crate::chain::SimChain;
use crate::network::{NetworkConfig, SimulatedNetwork, Undelivered};
use crate::NodeIndex;
use haltwatch_core::{BlockBroadcaster, ChainReader, Peer, PeerError, PeerMap, PeerSet};
use haltwatch_messages::MsgCode;
use haltwatch_production::SystemHaltedCheck;
use haltwatch_types::{Address, Block, NodeType};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Rewrites the payload of every message a node sends.
pub type Tamper = Arc<dyn Fn(MsgCode, Vec<u8>) -> Vec<u8> + Send + Sync>;

/// A message accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub code: MsgCode,
    pub payload: Vec<u8>,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages sent (successfully scheduled for delivery).
    pub messages_sent: u64,
    /// Messages dropped due to network partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Blocks delivered by broadcast.
    pub blocks_broadcast: u64,
}

impl TransportStats {
    /// Total messages dropped (partition + packet loss).
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition + self.messages_dropped_loss
    }
}

struct Endpoint {
    name: String,
    node_type: NodeType,
    address: Address,
    chain: Arc<SimChain>,
    check: Option<Weak<SystemHaltedCheck>>,
}

/// Shared transport for all nodes of a cluster.
pub struct SimTransport {
    network: Mutex<SimulatedNetwork>,
    /// RNG for network conditions (seeded for determinism).
    rng: Mutex<ChaCha8Rng>,
    endpoints: RwLock<Vec<Endpoint>>,
    tampers: RwLock<HashMap<NodeIndex, Tamper>>,
    log: Mutex<Vec<SentMessage>>,
    stats: Mutex<TransportStats>,
}

impl SimTransport {
    pub fn new(config: NetworkConfig, node_count: usize, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            network: Mutex::new(SimulatedNetwork::new(config, node_count)),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            endpoints: RwLock::new(Vec::with_capacity(node_count)),
            tampers: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            stats: Mutex::new(TransportStats::default()),
        })
    }

    /// Register the next node. Returns its index.
    pub fn register(
        &self,
        name: String,
        node_type: NodeType,
        address: Address,
        chain: Arc<SimChain>,
    ) -> NodeIndex {
        let mut endpoints = self.endpoints.write();
        endpoints.push(Endpoint {
            name,
            node_type,
            address,
            chain,
            check: None,
        });
        endpoints.len() - 1
    }

    /// Route messages for `node` to `check`.
    pub fn attach(&self, node: NodeIndex, check: &Arc<SystemHaltedCheck>) {
        if let Some(endpoint) = self.endpoints.write().get_mut(node) {
            endpoint.check = Some(Arc::downgrade(check));
        }
    }

    pub fn with_network<R>(&self, f: impl FnOnce(&mut SimulatedNetwork) -> R) -> R {
        f(&mut self.network.lock())
    }

    pub fn set_tamper(&self, node: NodeIndex, tamper: Tamper) {
        self.tampers.write().insert(node, tamper);
    }

    /// Every message accepted for delivery so far.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.log.lock().clone()
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.lock().clone()
    }

    /// `to` as seen from `from`.
    pub fn peer(self: &Arc<Self>, from: NodeIndex, to: NodeIndex) -> Option<Arc<dyn Peer>> {
        let endpoints = self.endpoints.read();
        let target = endpoints.get(to)?;
        Some(Arc::new(SimPeer {
            transport: self.clone(),
            from,
            to,
            name: target.name.clone(),
            node_type: target.node_type,
            address: target.address,
        }))
    }

    /// Connected peers of `node` with the given role, keyed by node name.
    fn peers_of(self: &Arc<Self>, node: NodeIndex, node_type: NodeType) -> PeerMap {
        let candidates: Vec<NodeIndex> = {
            let network = self.network.lock();
            let endpoints = self.endpoints.read();
            endpoints
                .iter()
                .enumerate()
                .filter(|(i, e)| e.node_type == node_type && network.is_connected(node, *i))
                .map(|(i, _)| i)
                .collect()
        };
        candidates
            .into_iter()
            .filter_map(|to| self.peer(node, to).map(|p| (p.node_name(), p)))
            .collect()
    }

    fn decide(&self, from: NodeIndex, to: NodeIndex) -> Result<Duration, Undelivered> {
        let network = self.network.lock();
        let mut rng = self.rng.lock();
        let decision = network.should_deliver(from, to, &mut rng);
        let mut stats = self.stats.lock();
        match decision {
            Ok(_) => {}
            Err(Undelivered::Partitioned) => stats.messages_dropped_partition += 1,
            Err(Undelivered::Lost) => stats.messages_dropped_loss += 1,
        }
        decision
    }

    fn send(
        self: &Arc<Self>,
        from: NodeIndex,
        to: NodeIndex,
        code: MsgCode,
        payload: Vec<u8>,
    ) -> Result<(), PeerError> {
        let latency = match self.decide(from, to) {
            Ok(latency) => latency,
            Err(Undelivered::Partitioned) => {
                return Err(PeerError::Disconnected(self.name_of(to)));
            }
            Err(Undelivered::Lost) => {
                trace!(from, to, %code, "Message lost");
                return Ok(());
            }
        };

        let tamper = self.tampers.read().get(&from).cloned();
        let payload = match tamper {
            Some(tamper) => tamper(code, payload),
            None => payload,
        };
        self.log.lock().push(SentMessage {
            from,
            to,
            code,
            payload: payload.clone(),
        });
        self.stats.lock().messages_sent += 1;

        let transport = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            transport.deliver(from, to, code, payload).await;
        });
        Ok(())
    }

    async fn deliver(self: Arc<Self>, from: NodeIndex, to: NodeIndex, code: MsgCode, payload: Vec<u8>) {
        let check = self
            .endpoints
            .read()
            .get(to)
            .and_then(|e| e.check.as_ref())
            .and_then(Weak::upgrade);
        let (Some(check), Some(reply_to)) = (check, self.peer(to, from)) else {
            return;
        };
        if let Err(e) = check.handle_message(code, &payload, reply_to).await {
            debug!(from, to, %code, error = %e, "Message rejected");
        }
    }

    fn broadcast_block(self: &Arc<Self>, from: NodeIndex, block: &Block) {
        let (seen_commits, targets) = {
            let endpoints = self.endpoints.read();
            let Some(origin) = endpoints.get(from) else {
                return;
            };
            let seen = origin.chain.get_seen_commit(block.number());
            let targets: Vec<(NodeIndex, Arc<SimChain>)> = endpoints
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != from)
                .map(|(i, e)| (i, e.chain.clone()))
                .collect();
            (seen, targets)
        };

        for (to, chain) in targets {
            let Ok(latency) = self.decide(from, to) else {
                continue;
            };
            self.stats.lock().blocks_broadcast += 1;
            let block = block.clone();
            let seen_commits = seen_commits.clone();
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                chain.import_block(block, seen_commits);
            });
        }
    }

    fn name_of(&self, node: NodeIndex) -> String {
        self.endpoints
            .read()
            .get(node)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("node-{node}"))
    }
}

/// A connection from one simulated node to another.
pub struct SimPeer {
    transport: Arc<SimTransport>,
    from: NodeIndex,
    to: NodeIndex,
    name: String,
    node_type: NodeType,
    address: Address,
}

impl Peer for SimPeer {
    fn send_msg(&self, code: MsgCode, payload: Vec<u8>) -> Result<(), PeerError> {
        self.transport.send(self.from, self.to, code, payload)
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

/// The peers one node is currently connected to.
pub struct SimPeerSet {
    transport: Arc<SimTransport>,
    node: NodeIndex,
}

impl SimPeerSet {
    pub fn new(transport: Arc<SimTransport>, node: NodeIndex) -> Self {
        Self { transport, node }
    }
}

impl PeerSet for SimPeerSet {
    fn boot_peers(&self) -> PeerMap {
        self.transport.peers_of(self.node, NodeType::VerifierBoot)
    }

    fn current_verifier_peers(&self) -> PeerMap {
        self.transport.peers_of(self.node, NodeType::Verifier)
    }

    /// The verifier set never rotates in simulation.
    fn next_verifier_peers(&self) -> PeerMap {
        self.transport.peers_of(self.node, NodeType::Verifier)
    }
}

/// Gossips saved blocks to every other node's chain.
pub struct SimBroadcaster {
    transport: Arc<SimTransport>,
    node: NodeIndex,
}

impl SimBroadcaster {
    pub fn new(transport: Arc<SimTransport>, node: NodeIndex) -> Self {
        Self { transport, node }
    }
}

impl BlockBroadcaster for SimBroadcaster {
    fn broadcast(&self, block: &Block) {
        self.transport.broadcast_block(self.node, block);
    }
}
