//! Simulated network with deterministic latency, packet loss, and partitions.

use crate::NodeIndex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(150),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// Why a message was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Undelivered {
    /// The nodes are partitioned; the sender sees a disconnected peer.
    Partitioned,
    /// Lost in transit; the sender does not notice.
    Lost,
}

/// Delivery decisions for a fixed set of nodes.
///
/// Supports:
/// - Configurable latency with jitter
/// - Packet loss (probabilistic message drops)
/// - Network partitions (blocking communication between node pairs)
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    node_count: usize,
    /// Partitioned node pairs. If (a, b) is in this set, messages from a to b are dropped.
    /// Partitions are directional - add both (a, b) and (b, a) for bidirectional partition.
    partitions: HashSet<(NodeIndex, NodeIndex)>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig, node_count: usize) -> Self {
        Self {
            config,
            node_count,
            partitions: HashSet::new(),
        }
    }

    // ─── Partition Management ───

    /// Check if two nodes are partitioned (message from `from` to `to` would be dropped).
    pub fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.partitions.contains(&(from, to))
    }

    /// Both directions are open. Peer sets only list connected peers.
    pub fn is_connected(&self, a: NodeIndex, b: NodeIndex) -> bool {
        a != b && !self.is_partitioned(a, b) && !self.is_partitioned(b, a)
    }

    /// Create a bidirectional partition between two nodes.
    pub fn partition_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Isolate a node from all other nodes in the network.
    pub fn isolate_node(&mut self, node: NodeIndex) {
        for other in 0..self.node_count {
            if other != node {
                self.partition_bidirectional(node, other);
            }
        }
    }

    /// Reconnect a node to every other node.
    pub fn heal_node(&mut self, node: NodeIndex) {
        self.partitions.retain(|&(a, b)| a != node && b != node);
    }

    /// Heal all partitions - restore full network connectivity.
    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    // ─── Packet Loss ───

    /// Check if a packet should be dropped based on the configured loss rate.
    pub fn should_drop_packet(&self, rng: &mut ChaCha8Rng) -> bool {
        self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate
    }

    /// Set the packet loss rate (0.0 - 1.0).
    pub fn set_packet_loss_rate(&mut self, rate: f64) {
        self.config.packet_loss_rate = rate.clamp(0.0, 1.0);
    }

    pub fn packet_loss_rate(&self) -> f64 {
        self.config.packet_loss_rate
    }

    // ─── Message Delivery Decision ───

    /// Determine if a message should be delivered from `from` to `to`, and
    /// after how long.
    pub fn should_deliver(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        rng: &mut ChaCha8Rng,
    ) -> Result<Duration, Undelivered> {
        // Check partition first (deterministic)
        if self.is_partitioned(from, to) {
            return Err(Undelivered::Partitioned);
        }

        // Check packet loss (probabilistic but deterministic with seeded RNG)
        if self.should_drop_packet(rng) {
            return Err(Undelivered::Lost);
        }

        Ok(self.sample_latency(rng))
    }

    pub fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let jitter_range = base * self.config.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.001))
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_latency_is_seeded() {
        let network = SimulatedNetwork::new(NetworkConfig::default(), 4);
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);

        let latency1 = network.sample_latency(&mut rng1);
        let latency2 = network.sample_latency(&mut rng2);

        assert_eq!(latency1, latency2, "Same seed should produce same latency");
        assert!(latency1 >= Duration::from_millis(135) && latency1 <= Duration::from_millis(165));
    }

    #[test]
    fn test_bidirectional_partition() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default(), 4);

        network.partition_bidirectional(0, 1);

        assert!(network.is_partitioned(0, 1));
        assert!(network.is_partitioned(1, 0));
        assert!(!network.is_connected(0, 1));
        assert!(network.is_connected(0, 2));

        network.heal_all();
        assert!(network.is_connected(0, 1));
    }

    #[test]
    fn test_isolate_and_heal_node() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default(), 4);

        network.isolate_node(0);

        // Node 0 can't communicate with anyone
        for other in 1..4 {
            assert!(network.is_partitioned(0, other));
            assert!(network.is_partitioned(other, 0));
        }
        // Other nodes can still communicate
        assert!(network.is_connected(1, 2));
        assert!(network.is_connected(2, 3));

        network.partition_bidirectional(1, 2);
        network.heal_node(0);
        assert!(network.is_connected(0, 3));
        assert!(!network.is_connected(1, 2));
        assert_eq!(network.partition_count(), 2);
    }

    #[test]
    fn test_packet_loss_rate() {
        let mut network = SimulatedNetwork::new(
            NetworkConfig {
                packet_loss_rate: 0.5,
                ..Default::default()
            },
            2,
        );

        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let iterations = 10000;
        let drops = (0..iterations)
            .filter(|_| network.should_drop_packet(&mut rng))
            .count();

        // Should be roughly 50% (within reasonable variance)
        let drop_rate = drops as f64 / iterations as f64;
        assert!(
            (0.45..0.55).contains(&drop_rate),
            "Expected ~50% drop rate, got {:.2}%",
            drop_rate * 100.0
        );

        // Clamping
        network.set_packet_loss_rate(1.5);
        assert_eq!(network.packet_loss_rate(), 1.0);

        network.set_packet_loss_rate(-0.5);
        assert_eq!(network.packet_loss_rate(), 0.0);
    }

    #[test]
    fn test_partition_takes_precedence_over_packet_loss() {
        let mut network = SimulatedNetwork::new(
            NetworkConfig {
                packet_loss_rate: 1.0,
                ..Default::default()
            },
            3,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        assert_eq!(network.should_deliver(0, 1, &mut rng), Err(Undelivered::Lost));

        network.partition_bidirectional(0, 1);
        assert_eq!(
            network.should_deliver(0, 1, &mut rng),
            Err(Undelivered::Partitioned)
        );
    }
}
