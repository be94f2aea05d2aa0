//! Halt-check configuration.

use haltwatch_types::{BootVerifierSet, HexError};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating a [`HaltCheckConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid boot verifier address: {0}")]
    InvalidAddress(#[from] HexError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the halt-check orchestrator.
///
/// # Example
///
/// ```
/// use haltwatch_production::HaltCheckConfig;
/// use std::time::Duration;
///
/// let config = HaltCheckConfig::default()
///     .with_check_ver_halt_duration(Duration::from_secs(30))
///     .with_wait_verifier_vote(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct HaltCheckConfig {
    /// Number of boot verifiers, including this node.
    ///
    /// Default: 4
    pub boot_count: usize,

    /// Size of the alive verifier committee.
    ///
    /// Default: 22
    pub verifier_count: usize,

    /// Interval between peer height probes.
    ///
    /// Default: 1 minute
    pub check_syn_status_duration: Duration,

    /// Time without a new block before a proposal round starts.
    ///
    /// Default: 5 minutes
    pub check_ver_halt_duration: Duration,

    /// How long to wait for every boot verifier's proposal. Also the back-off
    /// before retrying a failed round.
    ///
    /// Default: 1 minute
    pub wait_proposal_response_duration: Duration,

    /// How long the emitter collects alive-verifier votes.
    ///
    /// Default: 1 minute
    pub wait_verifier_vote: Duration,

    /// Interval of the verifier roster logs.
    ///
    /// Default: 30 seconds
    pub log_duration: Duration,

    /// The well-known boot verifier addresses.
    ///
    /// Default: empty (must be configured)
    pub boot_verifiers: Arc<BootVerifierSet>,
}

impl Default for HaltCheckConfig {
    fn default() -> Self {
        Self {
            boot_count: 4,
            verifier_count: 22,
            check_syn_status_duration: Duration::from_secs(60),
            check_ver_halt_duration: Duration::from_secs(5 * 60),
            wait_proposal_response_duration: Duration::from_secs(60),
            wait_verifier_vote: Duration::from_secs(60),
            log_duration: Duration::from_secs(30),
            boot_verifiers: Arc::new(BootVerifierSet::default()),
        }
    }
}

impl HaltCheckConfig {
    /// Set the boot verifier committee. Also sets `boot_count`.
    pub fn with_boot_verifiers(mut self, boot_verifiers: impl Into<Arc<BootVerifierSet>>) -> Self {
        let boot_verifiers = boot_verifiers.into();
        self.boot_count = boot_verifiers.len();
        self.boot_verifiers = boot_verifiers;
        self
    }

    /// Set the alive verifier committee size.
    pub fn with_verifier_count(mut self, count: usize) -> Self {
        self.verifier_count = count;
        self
    }

    /// Set the height probe interval.
    pub fn with_check_syn_status_duration(mut self, duration: Duration) -> Self {
        self.check_syn_status_duration = duration;
        self
    }

    /// Set the halt detection timeout.
    pub fn with_check_ver_halt_duration(mut self, duration: Duration) -> Self {
        self.check_ver_halt_duration = duration;
        self
    }

    /// Set the proposal collection timeout.
    pub fn with_wait_proposal_response_duration(mut self, duration: Duration) -> Self {
        self.wait_proposal_response_duration = duration;
        self
    }

    /// Set the vote collection window.
    pub fn with_wait_verifier_vote(mut self, duration: Duration) -> Self {
        self.wait_verifier_vote = duration;
        self
    }

    /// Set the roster log interval.
    pub fn with_log_duration(mut self, duration: Duration) -> Self {
        self.log_duration = duration;
        self
    }

    /// Check the committee and timing invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boot_count == 0 {
            return Err(ConfigError::Invalid("boot_count must be at least 1".into()));
        }
        if self.verifier_count == 0 {
            return Err(ConfigError::Invalid(
                "verifier_count must be at least 1".into(),
            ));
        }
        if self.boot_verifiers.len() != self.boot_count {
            return Err(ConfigError::Invalid(format!(
                "boot_count is {} but {} distinct boot verifier addresses are configured",
                self.boot_count,
                self.boot_verifiers.len()
            )));
        }
        let durations = [
            ("check_syn_status", self.check_syn_status_duration),
            ("check_ver_halt", self.check_ver_halt_duration),
            ("wait_proposal_response", self.wait_proposal_response_duration),
            ("wait_verifier_vote", self.wait_verifier_vote),
            ("log", self.log_duration),
        ];
        for (name, duration) in durations {
            if duration.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} duration must be non-zero")));
            }
        }
        Ok(())
    }

    /// Capacity of the height response channel: every boot peer and alive
    /// verifier may answer one probe.
    pub fn height_channel_capacity(&self) -> usize {
        (self.verifier_count + self.boot_count).saturating_sub(1).max(1)
    }

    /// Capacity of the peer proposal channel.
    pub fn proposal_channel_capacity(&self) -> usize {
        self.boot_count.saturating_sub(1).max(1)
    }

    /// Capacity of the alive vote channel.
    pub fn vote_channel_capacity(&self) -> usize {
        self.verifier_count.max(1)
    }

    /// Parse and validate a TOML config.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(s)?;
        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// On-disk layout.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    committee: CommitteeSection,
    #[serde(default)]
    timing: TimingSection,
}

#[derive(Debug, Deserialize)]
struct CommitteeSection {
    /// Defaults to the number of listed addresses.
    #[serde(default)]
    boot_count: Option<usize>,
    #[serde(default = "default_verifier_count")]
    verifier_count: usize,
    boot_verifiers: Vec<String>,
}

fn default_verifier_count() -> usize {
    22
}

#[derive(Debug, Deserialize)]
struct TimingSection {
    #[serde(default = "default_check_syn_status_ms")]
    check_syn_status_ms: u64,
    #[serde(default = "default_check_ver_halt_ms")]
    check_ver_halt_ms: u64,
    #[serde(default = "default_wait_ms")]
    wait_proposal_response_ms: u64,
    #[serde(default = "default_wait_ms")]
    wait_verifier_vote_ms: u64,
    #[serde(default = "default_log_ms")]
    log_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            check_syn_status_ms: default_check_syn_status_ms(),
            check_ver_halt_ms: default_check_ver_halt_ms(),
            wait_proposal_response_ms: default_wait_ms(),
            wait_verifier_vote_ms: default_wait_ms(),
            log_ms: default_log_ms(),
        }
    }
}

fn default_check_syn_status_ms() -> u64 {
    60_000
}

fn default_check_ver_halt_ms() -> u64 {
    300_000
}

fn default_wait_ms() -> u64 {
    60_000
}

fn default_log_ms() -> u64 {
    30_000
}

impl ConfigFile {
    fn into_config(self) -> Result<HaltCheckConfig, ConfigError> {
        let boot_verifiers = BootVerifierSet::from_hex_list(&self.committee.boot_verifiers)?;
        let boot_count = self.committee.boot_count.unwrap_or(boot_verifiers.len());
        let timing = self.timing;
        Ok(HaltCheckConfig {
            boot_count,
            verifier_count: self.committee.verifier_count,
            check_syn_status_duration: Duration::from_millis(timing.check_syn_status_ms),
            check_ver_halt_duration: Duration::from_millis(timing.check_ver_halt_ms),
            wait_proposal_response_duration: Duration::from_millis(
                timing.wait_proposal_response_ms,
            ),
            wait_verifier_vote: Duration::from_millis(timing.wait_verifier_vote_ms),
            log_duration: Duration::from_millis(timing.log_ms),
            boot_verifiers: Arc::new(boot_verifiers),
        })
    }
}
