//! Periodic peer height probe and roster log.

use super::{HaltContext, HeightInfo, SharedStatus};
use crate::metrics;
use crate::network::send_message;
use haltwatch_core::PeerMap;
use haltwatch_messages::HaltMessage;
use haltwatch_types::NodeType;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Ask boot and alive verifier peers for their height every
/// `check_syn_status_duration`, and record their answers.
pub(crate) async fn run_height_probe(
    ctx: Arc<HaltContext>,
    shared: Arc<SharedStatus>,
    mut heights: mpsc::Receiver<HeightInfo>,
    quit: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ctx.config.check_syn_status_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = quit.cancelled() => break,

            Some(info) = heights.recv() => record_height(&shared, info),

            _ = ticker.tick() => probe_peers(&ctx, &shared),
        }
    }
    debug!("Height probe stopped");
}

fn probe_peers(ctx: &HaltContext, shared: &SharedStatus) {
    let boot_peers = ctx.peers.boot_peers();
    let synced = boot_peers.len() + 1 == ctx.config.boot_count;
    if shared.syn_status.swap(synced, Ordering::SeqCst) != synced {
        info!(
            connected = boot_peers.len(),
            boot_count = ctx.config.boot_count,
            synced,
            "Boot verifier connectivity changed"
        );
    }
    metrics::set_syn_status(synced);

    let current = ctx.peers.current_verifier_peers();
    request_heights(&boot_peers);
    request_heights(&current);
}

fn request_heights(peers: &PeerMap) {
    for (name, peer) in peers {
        if let Err(e) = send_message(peer.as_ref(), &HaltMessage::CurrentBlockNumberRequest) {
            debug!(peer = %name, error = %e, "Height request failed");
        }
    }
}

fn record_height(shared: &SharedStatus, info: HeightInfo) {
    trace!(peer = %info.peer, node_type = %info.node_type, height = info.height, "Peer height");
    let table = match info.node_type {
        NodeType::VerifierBoot => &shared.other_boot_heights,
        NodeType::Verifier => &shared.verifier_heights,
        NodeType::Normal => return,
    };
    table.write().insert(info.peer, info.height);
}

/// Log the current verifier roster and which of them are connected, every
/// `log_duration`.
pub(crate) async fn run_roster_log(ctx: Arc<HaltContext>, quit: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.config.log_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = quit.cancelled() => break,

            _ = ticker.tick() => {
                let verifiers = ctx.chain.get_curr_verifiers();
                info!(
                    height = ctx.chain.current_block().number(),
                    verifiers = verifiers.len(),
                    current_peers = ?peer_names(&ctx.peers.current_verifier_peers()),
                    next_peers = ?peer_names(&ctx.peers.next_verifier_peers()),
                    "Verifier roster"
                );
                trace!(?verifiers, "Current verifier addresses");
            }
        }
    }
    debug!("Roster log stopped");
}

fn peer_names(peers: &PeerMap) -> Vec<&str> {
    let mut names: Vec<&str> = peers.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}
