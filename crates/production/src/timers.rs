//! Timer management for the halt-check loop.
//!
//! Timers are spawned as tokio tasks and can be cancelled. Each arm gets a
//! fresh generation number; a fire that was already queued when its timer
//! was cancelled or re-armed is recognised as stale by [`TimerManager::accept`].

use haltwatch_core::TimerId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A timer expiry as delivered to the owning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub generation: u64,
}

/// Manages one-shot timers for the halt-check loop.
///
/// Each timer is a tokio task that sleeps for the specified duration and then
/// sends a [`TimerFired`] to the loop's channel.
pub struct TimerManager {
    /// Active timers (id -> generation, task handle).
    timers: HashMap<TimerId, (u64, JoinHandle<()>)>,
    next_generation: u64,
    fired_tx: mpsc::Sender<TimerFired>,
}

impl TimerManager {
    /// Create a new timer manager.
    pub fn new(fired_tx: mpsc::Sender<TimerFired>) -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
            fired_tx,
        }
    }

    /// Set a timer that will fire after the given duration.
    ///
    /// If a timer with the same ID already exists, it is cancelled first, so
    /// re-arming resets the deadline.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        self.next_generation += 1;
        let generation = self.next_generation;
        let fired_tx = self.fired_tx.clone();

        let handle = tokio::spawn(async move {
            trace!(?id, ?duration, "Timer task started, sleeping");
            tokio::time::sleep(duration).await;
            trace!(?id, "Timer fired, sending event");
            // Receiver gone means the loop has shut down.
            let _ = fired_tx.send(TimerFired { id, generation }).await;
        });

        self.timers.insert(id, (generation, handle));
        debug!(?id, ?duration, "Timer set");
    }

    /// Cancel a timer.
    ///
    /// If the timer doesn't exist or has already fired, this is a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some((_, handle)) = self.timers.remove(&id) {
            handle.abort();
            debug!(?id, "Timer cancelled");
        }
    }

    /// Cancel all timers.
    ///
    /// Called on round abort and during shutdown.
    pub fn cancel_all(&mut self) {
        for (id, (_, handle)) in self.timers.drain() {
            handle.abort();
            trace!(?id, "Timer cancelled");
        }
    }

    /// Consume a fire. Returns `false` for a fire whose timer has since been
    /// cancelled or re-armed.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.timers.get(&fired.id) {
            Some((generation, _)) if *generation == fired.generation => {
                self.timers.remove(&fired.id);
                true
            }
            _ => {
                trace!(id = ?fired.id, "Dropping stale timer fire");
                false
            }
        }
    }

    /// Whether a timer with this ID is armed.
    pub fn is_set(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Get the number of active timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
