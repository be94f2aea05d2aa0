//! In-memory simulation of verifier-halt recovery.
//!
//! Runs real [`SystemHaltedCheck`](haltwatch_production::SystemHaltedCheck)
//! instances for a committee of boot verifiers, alive verifiers and normal
//! nodes, connected by a simulated network with seeded latency, packet loss
//! and partitions. Under a paused tokio clock
//! (`#[tokio::test(start_paused = true)]`) minute-scale protocol timers run
//! instantly and reproducibly.
//!
//! ```no_run
//! # use haltwatch_simulation::{ClusterConfig, HaltCluster};
//! # async fn run() -> Result<(), haltwatch_production::ConfigError> {
//! let cluster = HaltCluster::new(ClusterConfig::default())?;
//! cluster.start();
//! tokio::time::sleep(std::time::Duration::from_secs(400)).await;
//! assert!(cluster.heights().iter().all(|&h| h == 101));
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod chain;
mod cluster;
mod network;
mod transport;
mod wallet;

pub use chain::{InsertListener, SimChain, SimEconomy};
pub use cluster::{initial_head, sim_clock, ClusterConfig, HaltCluster, SimNode};
pub use network::{NetworkConfig, SimulatedNetwork, Undelivered};
pub use transport::{
    SentMessage, SimBroadcaster, SimPeer, SimPeerSet, SimTransport, Tamper, TransportStats,
};
pub use wallet::SimWallet;

/// Index of a node in a cluster.
pub type NodeIndex = usize;
