//! The boot verifier's halt-check loop and proposal rounds.

use super::{HaltContext, RoundFailure, SharedStatus};
use crate::metrics;
use crate::network::send_message;
use crate::timers::{TimerFired, TimerManager};
use haltwatch_core::{HaltError, PeerMap, TimerId};
use haltwatch_messages::{HaltMessage, ProposalMsg};
use haltwatch_recovery::{HaltHandler, ProposalOutcome};
use haltwatch_types::{BootVerifierSet, VoteMsg, VoteType};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument, Span};

/// Where the loop is within a proposal round.
enum Phase {
    Idle,
    /// Waiting for every boot verifier's proposal.
    CollectingProposals(RoundState),
    /// This node holds the minimum; waiting for alive-verifier votes.
    CollectingVotes(RoundState, ProposalMsg),
}

struct RoundState {
    id: u64,
    /// Head height the round builds on.
    head: u64,
    span: Span,
    /// Cancels this round's broadcast tasks.
    cancel: CancellationToken,
}

pub(crate) struct HaltLoop {
    ctx: Arc<HaltContext>,
    shared: Arc<SharedStatus>,
    timers: TimerManager,
    fired_rx: mpsc::Receiver<TimerFired>,
    fail_tx: mpsc::Sender<RoundFailure>,
    fail_rx: mpsc::Receiver<RoundFailure>,
    stop_tx: broadcast::Sender<u64>,
    quit: CancellationToken,

    /// Reused across rounds at the same head.
    handler: Option<HaltHandler>,
    phase: Phase,
    next_round_id: u64,
    last_block: u64,
}

impl HaltLoop {
    pub fn new(
        ctx: Arc<HaltContext>,
        shared: Arc<SharedStatus>,
        stop_tx: broadcast::Sender<u64>,
        quit: CancellationToken,
    ) -> Self {
        let (fired_tx, fired_rx) = mpsc::channel(16);
        let (fail_tx, fail_rx) = mpsc::channel(1);
        let last_block = ctx.chain.current_block().number();
        Self {
            ctx,
            shared,
            timers: TimerManager::new(fired_tx),
            fired_rx,
            fail_tx,
            fail_rx,
            stop_tx,
            quit,
            handler: None,
            phase: Phase::Idle,
            next_round_id: 0,
            last_block,
        }
    }

    pub async fn run(
        mut self,
        mut proposals: mpsc::Receiver<ProposalMsg>,
        mut votes: mpsc::Receiver<VoteMsg>,
        mut blocks: watch::Receiver<u64>,
    ) {
        self.arm_halt_timer();

        loop {
            let collecting_proposals = matches!(self.phase, Phase::CollectingProposals(_));
            let collecting_votes = matches!(self.phase, Phase::CollectingVotes(..));

            tokio::select! {
                biased;

                _ = self.quit.cancelled() => {
                    debug!("Halt loop quitting");
                    break;
                }

                changed = blocks.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let number = *blocks.borrow_and_update();
                    self.on_new_block(number);
                }

                Some(fired) = self.fired_rx.recv() => {
                    if self.timers.accept(fired) {
                        self.on_timer(fired.id);
                    }
                }

                Some(failure) = self.fail_rx.recv() => {
                    self.on_round_failure(failure);
                }

                Some(msg) = proposals.recv(), if collecting_proposals => {
                    self.on_proposal(msg);
                }

                Some(vote) = votes.recv(), if collecting_votes => {
                    self.on_alive_vote(vote);
                }
            }
        }

        self.end_round();
        self.timers.cancel_all();
    }

    fn arm_halt_timer(&mut self) {
        self.timers
            .set_timer(TimerId::VerifierHalt, self.ctx.config.check_ver_halt_duration);
    }

    fn on_new_block(&mut self, number: u64) {
        if number <= self.last_block {
            return;
        }
        self.last_block = number;

        let round_head = match &self.phase {
            Phase::Idle => None,
            Phase::CollectingProposals(round) | Phase::CollectingVotes(round, _) => {
                Some(round.head)
            }
        };
        if let Some(head) = round_head {
            if number > head {
                info!(head, new_block = number, "New block observed, cancelling proposal round");
                self.end_round();
            }
        }

        debug!(height = number, "New block, resetting halt timer");
        self.timers.cancel_timer(TimerId::ProposalRetry);
        self.arm_halt_timer();
    }

    fn on_timer(&mut self, id: TimerId) {
        match id {
            TimerId::VerifierHalt | TimerId::ProposalRetry => {
                if matches!(self.phase, Phase::Idle) {
                    if id == TimerId::VerifierHalt {
                        warn!(
                            height = self.last_block,
                            "No new block within the halt interval, verifiers may have halted"
                        );
                    }
                    self.start_round();
                }
            }
            TimerId::WaitProposalResponse => {
                if matches!(self.phase, Phase::CollectingProposals(_)) {
                    self.fail_round(HaltError::WaitEmptyBlockExpireError);
                }
            }
            TimerId::WaitVerifierVote => {
                if matches!(self.phase, Phase::CollectingVotes(..)) {
                    self.finalise();
                }
            }
        }
    }

    fn start_round(&mut self) {
        metrics::record_proposal_round();

        let config = match self
            .ctx
            .state_handler
            .gen_proposal_config(VoteType::VerBootNodeVote)
        {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Cannot build proposal config");
                metrics::record_proposal_failure();
                self.schedule_retry();
                return;
            }
        };
        let head = config.cur_block.number();

        let handler = match self.handler.take() {
            Some(handler) if handler.cur_block_number() == head => {
                debug!(head, proposals = handler.proposal_count(), "Reusing halt handler");
                handler
            }
            _ => HaltHandler::new(config, self.ctx.config.boot_verifiers.clone()),
        };
        let handler = self.handler.insert(handler);

        let proposal = match handler.propose_empty_block() {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(head, error = %e, "Cannot build empty block proposal");
                metrics::record_proposal_failure();
                self.schedule_retry();
                return;
            }
        };
        let selection = handler.selection();

        self.next_round_id += 1;
        let round = RoundState {
            id: self.next_round_id,
            head,
            span: info_span!(
                "halt_round",
                round_id = self.next_round_id,
                head,
                hash = %proposal.block_hash()
            ),
            cancel: self.quit.child_token(),
        };
        round.span.in_scope(|| info!("Starting empty block proposal round"));

        self.shared.proposing.store(true, Ordering::SeqCst);
        self.spawn_round_task(
            &round,
            send_to_boot_peers(
                self.ctx.peers.boot_peers(),
                proposal,
                self.ctx.config.boot_verifiers.clone(),
            ),
        );
        self.timers.set_timer(
            TimerId::WaitProposalResponse,
            self.ctx.config.wait_proposal_response_duration,
        );
        self.phase = Phase::CollectingProposals(round);

        if let Some(outcome) = selection {
            self.on_outcome(outcome);
        }
    }

    fn on_proposal(&mut self, msg: ProposalMsg) {
        let (Phase::CollectingProposals(round), Some(handler)) = (&self.phase, &mut self.handler)
        else {
            return;
        };
        let from = msg.signer();
        let result = round.span.in_scope(|| handler.handle_proposal(msg));
        match result {
            Ok(outcome) => self.on_outcome(outcome),
            Err(e) if e.is_informational() => debug!(%from, reason = %e, "Proposal not final"),
            Err(e) => {
                warn!(%from, error = %e, "Dropping invalid proposal");
                metrics::record_invalid_message("proposal");
            }
        }
    }

    fn on_outcome(&mut self, outcome: ProposalOutcome) {
        let round = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::CollectingProposals(round) => round,
            other => {
                self.phase = other;
                return;
            }
        };
        self.timers.cancel_timer(TimerId::WaitProposalResponse);

        match outcome {
            ProposalOutcome::Selected(proposal) => {
                round
                    .span
                    .in_scope(|| info!("Own proposal selected, requesting alive verifier votes"));
                let peers = self.ctx.peers.current_verifier_peers();
                self.spawn_round_task(&round, send_minimal_hash_block(peers, proposal.clone()));
                self.timers
                    .set_timer(TimerId::WaitVerifierVote, self.ctx.config.wait_verifier_vote);
                self.phase = Phase::CollectingVotes(round, proposal);
            }
            ProposalOutcome::Complete { min_hash } => {
                round
                    .span
                    .in_scope(|| info!(%min_hash, "Another boot verifier emits the empty block"));
                // The proposal broadcast keeps running: a boot peer that
                // proposed late still needs it.
                self.end_round();
                self.arm_halt_timer();
            }
        }
    }

    fn on_alive_vote(&mut self, vote: VoteMsg) {
        let (Phase::CollectingVotes(round, _), Some(handler)) = (&self.phase, &mut self.handler)
        else {
            return;
        };
        let _guard = round.span.enter();

        let voter = vote.signer();
        let current = self.ctx.chain.get_curr_verifiers();
        match handler.handle_alive_vote(vote, &current) {
            Ok(true) => debug!(%voter, votes = handler.votes_len(), "Alive vote recorded"),
            Ok(false) => trace!(%voter, "Duplicate alive vote ignored"),
            Err(e) => {
                warn!(%voter, error = %e, "Dropping invalid alive vote");
                metrics::record_invalid_message("vote");
            }
        }
    }

    fn finalise(&mut self) {
        let Phase::CollectingVotes(round, proposal) = &self.phase else {
            return;
        };
        let span = round.span.clone();
        let proposal = proposal.clone();
        let votes: Vec<VoteMsg> = self
            .handler
            .as_ref()
            .map(|h| h.alive_votes().values().cloned().collect())
            .unwrap_or_default();
        let vote_count = votes.len();

        let result = span.in_scope(|| {
            self.ctx
                .state_handler
                .save_final_empty_block(&proposal, votes)
        });
        match result {
            Ok(()) => {
                metrics::record_empty_block_saved(vote_count);
                self.ctx.broadcaster.broadcast(&proposal.empty_block);
                span.in_scope(|| {
                    info!(
                        height = proposal.height(),
                        alive_votes = vote_count,
                        "Empty block finalised and broadcast"
                    )
                });
                self.end_round();
                self.arm_halt_timer();
            }
            Err(e) => self.fail_round(e),
        }
    }

    fn on_round_failure(&mut self, failure: RoundFailure) {
        let current = match &self.phase {
            Phase::Idle => None,
            Phase::CollectingProposals(round) | Phase::CollectingVotes(round, _) => Some(round.id),
        };
        if current == Some(failure.round_id) {
            self.fail_round(failure.error);
        } else {
            trace!(round_id = failure.round_id, "Ignoring failure of a finished round");
        }
    }

    /// Abort the current round and schedule the next attempt.
    ///
    /// A proposal timeout retries at once; the wait itself paced it. Every
    /// other failure backs off for one proposal wait.
    fn fail_round(&mut self, error: HaltError) {
        metrics::record_proposal_failure();
        warn!(error = %error, "Proposal round failed");
        self.end_round();
        if matches!(error, HaltError::WaitEmptyBlockExpireError) {
            self.start_round();
        } else {
            self.schedule_retry();
        }
    }

    fn schedule_retry(&mut self) {
        self.timers.set_timer(
            TimerId::ProposalRetry,
            self.ctx.config.wait_proposal_response_duration,
        );
    }

    /// Leave the current round, cancelling its timers and tasks.
    fn end_round(&mut self) {
        if let Phase::CollectingProposals(round) | Phase::CollectingVotes(round, _) =
            std::mem::replace(&mut self.phase, Phase::Idle)
        {
            round.cancel.cancel();
            trace!(round_id = round.id, "Round ended");
        }
        self.timers.cancel_timer(TimerId::WaitProposalResponse);
        self.timers.cancel_timer(TimerId::WaitVerifierVote);
        self.shared.proposing.store(false, Ordering::SeqCst);
    }

    /// Run a broadcast for `round`, exiting early on round cancellation, a
    /// newly inserted block, or shutdown. Failures come back to the loop.
    fn spawn_round_task<F>(&self, round: &RoundState, task: F)
    where
        F: std::future::Future<Output = Result<(), HaltError>> + Send + 'static,
    {
        let round_id = round.id;
        let head = round.head;
        let cancel = round.cancel.clone();
        let stop_rx = self.stop_tx.subscribe();
        let fail_tx = self.fail_tx.clone();

        tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    height = wait_for_block_above(stop_rx, head) => {
                        debug!(height, "Broadcast stopped by new block");
                    }
                    result = task => {
                        if let Err(error) = result {
                            // Control channel: wait for room unless the loop is gone.
                            let _ = fail_tx.send(RoundFailure { round_id, error }).await;
                        }
                    }
                }
            }
            .instrument(round.span.clone()),
        );
    }
}

/// Resolve with the first reported block height above `head`.
///
/// Stale or repeated heights are skipped. Only the newest height matters, so
/// a lagged receiver just reads on.
async fn wait_for_block_above(mut stop_rx: broadcast::Receiver<u64>, head: u64) -> u64 {
    loop {
        match stop_rx.recv().await {
            Ok(height) if height > head => return height,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            // The service is gone; the round token ends the task.
            Err(RecvError::Closed) => return std::future::pending().await,
        }
    }
}

/// Send our proposal to every connected boot peer.
///
/// Fails the round on the first peer that is not a boot verifier or that
/// cannot be reached.
async fn send_to_boot_peers(
    peers: PeerMap,
    proposal: ProposalMsg,
    boot_verifiers: Arc<BootVerifierSet>,
) -> Result<(), HaltError> {
    let message = HaltMessage::ProposeEmptyBlock(proposal);
    for (name, peer) in peers {
        let address = peer.remote_verifier_address();
        if !boot_verifiers.contains(&address) {
            return Err(HaltError::AddressIsNotVerifierBootNode(address));
        }
        send_message(peer.as_ref(), &message)?;
        debug!(peer = %name, "Sent proposal to boot peer");
        tokio::task::yield_now().await;
    }
    Ok(())
}

/// Send the minimal-hash block to every connected alive verifier. A peer
/// that cannot be reached just does not vote this round.
async fn send_minimal_hash_block(peers: PeerMap, proposal: ProposalMsg) -> Result<(), HaltError> {
    let message = HaltMessage::SendMinimalHashBlock(proposal);
    for (name, peer) in peers {
        match send_message(peer.as_ref(), &message) {
            Ok(()) => debug!(peer = %name, "Sent minimal hash block"),
            Err(e) => warn!(peer = %name, error = %e, "Failed to send minimal hash block"),
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}
