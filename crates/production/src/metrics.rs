//! Production metrics using native Prometheus client.
//!
//! Metrics are halt-recovery specific rather than generic event counters.
//! Use traces for event-level granularity during investigations.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain-specific metrics for production monitoring.
pub struct Metrics {
    // === Chain ===
    pub block_height: Gauge,

    // === Halt check ===
    pub syn_status: Gauge,
    pub proposal_rounds: Counter,
    pub proposal_failures: Counter,
    pub empty_blocks_saved: Counter,
    pub alive_votes_collected: Histogram,

    // === Network ===
    pub network_messages_sent: Counter,
    pub network_messages_received: Counter,

    // === Errors ===
    pub invalid_messages_received: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        // Votes per finalised round: 0 up to a large committee
        let vote_buckets = vec![0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 22.0, 32.0, 64.0, 128.0];

        Self {
            block_height: register_gauge!(
                "haltwatch_block_height",
                "Height of the last block observed by the halt check"
            )
            .unwrap(),

            syn_status: register_gauge!(
                "haltwatch_syn_status",
                "1 when every other boot verifier is connected, 0 otherwise"
            )
            .unwrap(),

            proposal_rounds: register_counter!(
                "haltwatch_proposal_rounds_total",
                "Total number of empty block proposal rounds started"
            )
            .unwrap(),

            proposal_failures: register_counter!(
                "haltwatch_proposal_failures_total",
                "Total number of proposal rounds that failed and were retried"
            )
            .unwrap(),

            empty_blocks_saved: register_counter!(
                "haltwatch_empty_blocks_saved_total",
                "Total number of empty blocks finalised by this node"
            )
            .unwrap(),

            alive_votes_collected: register_histogram!(
                "haltwatch_alive_votes_collected",
                "Alive verifier votes collected per finalised empty block",
                vote_buckets
            )
            .unwrap(),

            network_messages_sent: register_counter!(
                "haltwatch_network_messages_sent_total",
                "Total halt-recovery messages sent"
            )
            .unwrap(),

            network_messages_received: register_counter!(
                "haltwatch_network_messages_received_total",
                "Total halt-recovery messages received"
            )
            .unwrap(),

            invalid_messages_received: register_counter_vec!(
                "haltwatch_invalid_messages_total",
                "Total peer messages dropped as invalid",
                &["reason"]
            )
            .unwrap(),
        }
    }
}

/// Get or initialize the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Record a newly observed block height.
pub fn set_block_height(height: u64) {
    metrics().block_height.set(height as f64);
}

/// Update the boot peer synchronisation status.
pub fn set_syn_status(synchronized: bool) {
    metrics()
        .syn_status
        .set(if synchronized { 1.0 } else { 0.0 });
}

/// Record a proposal round start.
pub fn record_proposal_round() {
    metrics().proposal_rounds.inc();
}

/// Record a failed proposal round.
pub fn record_proposal_failure() {
    metrics().proposal_failures.inc();
}

/// Record a finalised empty block with its alive vote count.
pub fn record_empty_block_saved(alive_votes: usize) {
    let m = metrics();
    m.empty_blocks_saved.inc();
    m.alive_votes_collected.observe(alive_votes as f64);
}

/// Record network message sent.
pub fn record_network_message_sent() {
    metrics().network_messages_sent.inc();
}

/// Record network message received.
pub fn record_network_message_received() {
    metrics().network_messages_received.inc();
}

/// Record a dropped peer message.
///
/// **Cardinality control**: Use only these predefined reasons:
/// - `"decode"` - payload failed to decode
/// - `"peer_type"` - sender role not allowed for this message
/// - `"proposal"` - proposal failed validation
/// - `"vote"` - alive vote failed validation
/// - `"unhandled"` - message code not serviced by this role
///
/// Do NOT use dynamic strings (e.g., error messages) as reasons.
pub fn record_invalid_message(reason: &str) {
    debug_assert!(
        matches!(
            reason,
            "decode" | "peer_type" | "proposal" | "vote" | "unhandled"
        ),
        "Unknown invalid message reason: {} - add to allowed list or use existing",
        reason
    );
    metrics()
        .invalid_messages_received
        .with_label_values(&[reason])
        .inc();
}
