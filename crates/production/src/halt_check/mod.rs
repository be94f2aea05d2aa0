//! Verifier-halt detection and empty-block recovery.
//!
//! [`SystemHaltedCheck`] is role-parameterised:
//!
//! - **VerifierBoot** runs the halt-check loop, the peer height probe and the
//!   roster log tickers, and accepts proposals and alive votes from peers.
//! - **Verifier** (alive verifier) only answers minimal-hash block requests.
//! - **Normal** only answers height requests.
//!
//! # Architecture
//!
//! A single task owns the [`HaltHandler`](haltwatch_recovery::HaltHandler)
//! and every timer. Peer messages reach it through bounded channels; per-round
//! broadcasts run as separate tasks that report failures back on a channel.
//!
//! ```text
//!   transport ──handle_message──┬─ proposals ─┐
//!                               ├─ votes ─────┤
//!                               └─ heights ─┐ │
//!   node ──on_block_inserted── watch ───────┼─┤
//!                                           ▼ ▼
//!                                  height probe  halt loop ──spawn──▶ round broadcasts
//!                                                    ▲                    │
//!                                                    └──── round failure ─┘
//! ```

mod handlers;
mod probe;
mod round;

use crate::config::{ConfigError, HaltCheckConfig};
use crate::state_handler::{system_clock, Clock, StateHandler};
use haltwatch_core::{BlockBroadcaster, ChainReader, EconomyModel, PeerSet, WalletSigner};
use haltwatch_messages::ProposalMsg;
use haltwatch_recovery::AliveVerifierHandler;
use haltwatch_types::{NodeType, VoteMsg};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use handlers::handled_codes;

/// Collaborators the halt check is built from.
#[derive(Clone)]
pub struct HaltCheckDeps {
    pub chain: Arc<dyn ChainReader>,
    pub wallet: Arc<dyn WalletSigner>,
    pub peers: Arc<dyn PeerSet>,
    pub broadcaster: Arc<dyn BlockBroadcaster>,
    pub economy: Arc<dyn EconomyModel>,
    pub clock: Clock,
}

impl HaltCheckDeps {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        wallet: Arc<dyn WalletSigner>,
        peers: Arc<dyn PeerSet>,
        broadcaster: Arc<dyn BlockBroadcaster>,
        economy: Arc<dyn EconomyModel>,
    ) -> Self {
        Self {
            chain,
            wallet,
            peers,
            broadcaster,
            economy,
            clock: system_clock(),
        }
    }

    /// Replace the wall clock used for proposal and vote timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// Point-in-time view of the halt check, for operators and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaltCheckStatus {
    /// Every other boot verifier is connected.
    pub syn_status: bool,
    /// A proposal round is in progress.
    pub proposing: bool,
    /// Last reported height per connected boot peer.
    pub other_boot_heights: HashMap<String, u64>,
    /// Last reported height per connected alive verifier.
    pub verifier_heights: HashMap<String, u64>,
}

/// A peer's answer to a height probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeightInfo {
    pub peer: String,
    pub node_type: NodeType,
    pub height: u64,
}

/// A per-round task's failure, tagged with the round it belongs to.
#[derive(Debug)]
pub(crate) struct RoundFailure {
    pub round_id: u64,
    pub error: haltwatch_core::HaltError,
}

/// State shared between the halt loop, the probe and message handlers.
#[derive(Default)]
pub(crate) struct SharedStatus {
    pub syn_status: AtomicBool,
    pub proposing: AtomicBool,
    pub other_boot_heights: RwLock<HashMap<String, u64>>,
    pub verifier_heights: RwLock<HashMap<String, u64>>,
}

/// Read-only collaborators shared by every task.
pub(crate) struct HaltContext {
    pub config: Arc<HaltCheckConfig>,
    pub chain: Arc<dyn ChainReader>,
    pub wallet: Arc<dyn WalletSigner>,
    pub peers: Arc<dyn PeerSet>,
    pub broadcaster: Arc<dyn BlockBroadcaster>,
    pub state_handler: StateHandler,
}

/// Receiving ends owned by the boot verifier tasks once started.
struct LoopReceivers {
    proposals: mpsc::Receiver<ProposalMsg>,
    votes: mpsc::Receiver<VoteMsg>,
    heights: mpsc::Receiver<HeightInfo>,
    blocks: watch::Receiver<u64>,
}

/// The halt-check service of one node.
pub struct SystemHaltedCheck {
    node_type: NodeType,
    ctx: Arc<HaltContext>,
    shared: Arc<SharedStatus>,
    alive_handler: AliveVerifierHandler,

    proposal_tx: mpsc::Sender<ProposalMsg>,
    vote_tx: mpsc::Sender<VoteMsg>,
    height_tx: mpsc::Sender<HeightInfo>,
    block_tx: watch::Sender<u64>,
    stop_tx: broadcast::Sender<u64>,

    receivers: Mutex<Option<LoopReceivers>>,
    quit: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SystemHaltedCheck {
    /// Build the service. Boot verifiers require a valid committee config.
    pub fn new(
        node_type: NodeType,
        config: HaltCheckConfig,
        deps: HaltCheckDeps,
    ) -> Result<Self, ConfigError> {
        if node_type == NodeType::VerifierBoot {
            config.validate()?;
            if !config.boot_verifiers.contains(&deps.wallet.address()) {
                return Err(ConfigError::Invalid(format!(
                    "local address {} is not a configured boot verifier",
                    deps.wallet.address()
                )));
            }
        }

        let (proposal_tx, proposals) = mpsc::channel(config.proposal_channel_capacity());
        let (vote_tx, votes) = mpsc::channel(config.vote_channel_capacity());
        let (height_tx, heights) = mpsc::channel(config.height_channel_capacity());
        let (block_tx, blocks) = watch::channel(deps.chain.current_block().number());
        let (stop_tx, _) = broadcast::channel(1);

        let state_handler =
            StateHandler::new(deps.chain.clone(), deps.wallet.clone(), deps.economy.clone())
                .with_clock(deps.clock.clone());
        let alive_handler = AliveVerifierHandler::new(config.boot_verifiers.clone());

        let ctx = Arc::new(HaltContext {
            config: Arc::new(config),
            chain: deps.chain,
            wallet: deps.wallet,
            peers: deps.peers,
            broadcaster: deps.broadcaster,
            state_handler,
        });

        Ok(Self {
            node_type,
            ctx,
            shared: Arc::new(SharedStatus::default()),
            alive_handler,
            proposal_tx,
            vote_tx,
            height_tx,
            block_tx,
            stop_tx,
            receivers: Mutex::new(Some(LoopReceivers {
                proposals,
                votes,
                heights,
                blocks,
            })),
            quit: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Spawn the halt loop, height probe and roster tickers.
    ///
    /// No-op for non-boot roles and on repeated calls. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        if self.node_type != NodeType::VerifierBoot {
            debug!(node_type = %self.node_type, "Halt check not started for this role");
            return;
        }
        let Some(receivers) = self.receivers.lock().take() else {
            warn!("Halt check already started");
            return;
        };

        let halt_loop = round::HaltLoop::new(
            self.ctx.clone(),
            self.shared.clone(),
            self.stop_tx.clone(),
            self.quit.clone(),
        );
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(halt_loop.run(
            receivers.proposals,
            receivers.votes,
            receivers.blocks,
        )));
        tasks.push(tokio::spawn(probe::run_height_probe(
            self.ctx.clone(),
            self.shared.clone(),
            receivers.heights,
            self.quit.clone(),
        )));
        tasks.push(tokio::spawn(probe::run_roster_log(
            self.ctx.clone(),
            self.quit.clone(),
        )));

        info!(
            address = %self.ctx.wallet.address(),
            boot_count = self.ctx.config.boot_count,
            verifier_count = self.ctx.config.verifier_count,
            "Halt check started"
        );
    }

    /// Signal every task to exit. Idempotent; no-op for non-boot roles.
    pub fn stop(&self) {
        if self.node_type != NodeType::VerifierBoot || self.quit.is_cancelled() {
            return;
        }
        self.quit.cancel();
        info!("Halt check stopping");
    }

    /// Wait for all spawned tasks to finish after [`SystemHaltedCheck::stop`].
    pub async fn join(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Halt check task ended abnormally");
            }
        }
    }

    /// Report a block inserted into the local chain.
    ///
    /// Resets halt detection and cancels an in-flight proposal round.
    pub fn on_block_inserted(&self, number: u64) {
        crate::metrics::set_block_height(number);
        let advanced = self.block_tx.send_if_modified(|current| {
            if number > *current {
                *current = number;
                true
            } else {
                false
            }
        });
        if advanced && self.shared.proposing.load(Ordering::SeqCst) {
            // No receivers just means no round task is listening.
            let _ = self.stop_tx.send(number);
        }
    }

    pub fn status(&self) -> HaltCheckStatus {
        HaltCheckStatus {
            syn_status: self.shared.syn_status.load(Ordering::SeqCst),
            proposing: self.shared.proposing.load(Ordering::SeqCst),
            other_boot_heights: self.shared.other_boot_heights.read().clone(),
            verifier_heights: self.shared.verifier_heights.read().clone(),
        }
    }
}

impl Drop for SystemHaltedCheck {
    fn drop(&mut self) {
        self.quit.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FlatEconomy, MockChain, MockPeers, MockWallet, RecordingBroadcaster};
    use haltwatch_core::ChainError;
    use haltwatch_types::test_utils::{test_head, test_key};
    use haltwatch_types::BootVerifierSet;
    use std::time::Duration;

    struct Fixture {
        chain: Arc<MockChain>,
        broadcaster: Arc<RecordingBroadcaster>,
        check: SystemHaltedCheck,
    }

    fn lone_boot(node_type: NodeType, label: &str) -> Fixture {
        let chain = Arc::new(MockChain::new(test_head(100, 0), vec![]));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let deps = HaltCheckDeps::new(
            chain.clone(),
            Arc::new(MockWallet(test_key(label))),
            Arc::new(MockPeers::default()),
            broadcaster.clone(),
            Arc::new(FlatEconomy),
        )
        .with_clock(Arc::new(|| 1_000_000));
        let config = HaltCheckConfig::default().with_boot_verifiers(Arc::new(BootVerifierSet::new([
            test_key("boot-0").address(),
        ])));
        let check = SystemHaltedCheck::new(node_type, config, deps).unwrap();
        Fixture {
            chain,
            broadcaster,
            check,
        }
    }

    #[test]
    fn test_boot_role_requires_own_address_in_set() {
        let chain = Arc::new(MockChain::new(test_head(1, 0), vec![]));
        let deps = HaltCheckDeps::new(
            chain,
            Arc::new(MockWallet(test_key("stranger"))),
            Arc::new(MockPeers::default()),
            Arc::new(RecordingBroadcaster::default()),
            Arc::new(FlatEconomy),
        );
        let config = HaltCheckConfig::default().with_boot_verifiers(Arc::new(BootVerifierSet::new([
            test_key("boot-0").address(),
        ])));

        assert!(matches!(
            SystemHaltedCheck::new(NodeType::VerifierBoot, config.clone(), deps.clone()),
            Err(ConfigError::Invalid(_))
        ));
        // Other roles do not need to be in the set.
        assert!(SystemHaltedCheck::new(NodeType::Verifier, config, deps).is_ok());
    }

    #[tokio::test]
    async fn test_non_boot_roles_do_not_start() {
        let fixture = lone_boot(NodeType::Verifier, "verifier-0");
        fixture.check.start();
        assert!(fixture.check.tasks.lock().is_empty());
        fixture.check.stop();
        fixture.check.stop();
        assert_eq!(fixture.check.status(), HaltCheckStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_boot_verifier_emits_empty_block() {
        let fixture = lone_boot(NodeType::VerifierBoot, "boot-0");
        fixture.check.start();

        tokio::time::sleep(Duration::from_secs(330)).await;
        assert!(fixture.check.status().proposing);
        assert_eq!(fixture.chain.blocks.lock().len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let head = fixture.chain.current_block();
        assert_eq!(head.number(), 101);
        assert!(head.is_empty_block());
        assert_eq!(fixture.broadcaster.blocks.lock().as_slice(), &[head]);
        assert!(!fixture.check.status().proposing);

        fixture.check.stop();
        fixture.check.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_insertion_resets_halt_timer() {
        let fixture = lone_boot(NodeType::VerifierBoot, "boot-0");
        fixture.check.start();

        tokio::time::sleep(Duration::from_secs(200)).await;
        fixture.check.on_block_inserted(101);

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert!(!fixture.check.status().proposing);
        assert_eq!(fixture.chain.blocks.lock().len(), 1);

        tokio::time::sleep(Duration::from_secs(111)).await;
        assert_eq!(fixture.chain.blocks.lock().len(), 2);

        fixture.check.stop();
        fixture.check.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_during_round_cancels_it() {
        let fixture = lone_boot(NodeType::VerifierBoot, "boot-0");
        fixture.check.start();

        // Collecting alive votes on head 100.
        tokio::time::sleep(Duration::from_secs(330)).await;
        assert!(fixture.check.status().proposing);

        fixture.check.on_block_inserted(101);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!fixture.check.status().proposing);

        // Past the point where the vote wait would have finalised.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fixture.chain.blocks.lock().len(), 1);
        assert!(fixture.broadcaster.blocks.lock().is_empty());
        assert!(!fixture.check.status().proposing);

        fixture.check.stop();
        fixture.check.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_block_does_not_signal_round_stop() {
        let fixture = lone_boot(NodeType::VerifierBoot, "boot-0");
        fixture.check.start();

        tokio::time::sleep(Duration::from_secs(330)).await;
        let mut stop_rx = fixture.check.stop_tx.subscribe();

        fixture.check.on_block_inserted(100);
        fixture.check.on_block_inserted(99);
        assert!(stop_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fixture.check.status().proposing);

        fixture.check.on_block_inserted(101);
        assert_eq!(stop_rx.try_recv().unwrap(), 101);

        fixture.check.stop();
        fixture.check.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_retried() {
        let fixture = lone_boot(NodeType::VerifierBoot, "boot-0");
        *fixture.chain.save_error.lock() = Some(ChainError::Storage("disk".into()));
        fixture.check.start();

        // The vote wait ends at 360 s and the save fails.
        tokio::time::sleep(Duration::from_secs(361)).await;
        assert_eq!(fixture.chain.blocks.lock().len(), 1);
        assert!(fixture.broadcaster.blocks.lock().is_empty());
        assert!(!fixture.check.status().proposing);

        // Retry after one proposal wait, then another vote wait.
        *fixture.chain.save_error.lock() = None;
        tokio::time::sleep(Duration::from_secs(125)).await;
        let head = fixture.chain.current_block();
        assert_eq!(head.number(), 101);
        assert!(head.is_empty_block());
        assert_eq!(fixture.broadcaster.blocks.lock().as_slice(), &[head]);

        fixture.check.stop();
        fixture.check.join().await;
    }
}
