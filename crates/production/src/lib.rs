//! Tokio orchestrator for verifier-halt recovery.
//!
//! Wraps the synchronous protocol logic of `haltwatch-recovery` with real
//! async I/O:
//!
//! - Peer messages via [`SystemHaltedCheck::handle_message`] and bounded
//!   tokio channels
//! - Halt detection, proposal and vote windows via tokio timers
//! - Chain, state and wallet access through [`StateHandler`]
//!
//! # Architecture
//!
//! A single task per boot verifier owns the round state and receives events
//! over channels, so protocol state is never shared behind a lock. See
//! [`halt_check`] for the task layout.
//!
//! ```no_run
//! # use haltwatch_production::{HaltCheckConfig, HaltCheckDeps, SystemHaltedCheck};
//! # use haltwatch_types::NodeType;
//! # async fn run(deps: HaltCheckDeps) -> Result<(), Box<dyn std::error::Error>> {
//! let config = HaltCheckConfig::load("haltwatch.toml")?;
//! let check = SystemHaltedCheck::new(NodeType::VerifierBoot, config, deps)?;
//! check.start();
//!
//! // The node reports every block it inserts:
//! check.on_block_inserted(101);
//!
//! check.stop();
//! check.join().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod halt_check;
pub mod metrics;
pub mod network;
pub mod state_handler;
pub mod telemetry;
mod timers;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, HaltCheckConfig};
pub use halt_check::{handled_codes, HaltCheckDeps, HaltCheckStatus, SystemHaltedCheck};
pub use state_handler::{system_clock, Clock, StateHandler};
pub use telemetry::{encode_metrics, init_logging, LoggingConfig, TelemetryError};
pub use timers::{TimerFired, TimerManager};
