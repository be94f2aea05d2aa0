//! Logging initialization and metrics export.
//!
//! The halt check only logs through `tracing` macros; the binary embedding it
//! decides where those logs go by calling [`init_logging`] once at startup.
//! Prometheus metrics are registered lazily (see [`crate::metrics`]) and
//! rendered on demand by [`encode_metrics`].

use prometheus::{Encoder, TextEncoder};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to encode metrics: {0}")]
    MetricsEncode(#[from] prometheus::Error),

    #[error("Metrics are not valid UTF-8: {0}")]
    MetricsUtf8(#[from] std::string::FromUtf8Error),
}

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Include thread ids in every line.
    pub thread_ids: bool,
    /// Emit ANSI colour codes.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info,haltwatch=debug".to_string(),
            thread_ids: true,
            ansi: true,
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.default_filter`. Fails if a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(config.thread_ids)
        .with_ansi(config.ansi);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Render every registered Prometheus metric in text exposition format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_filter, "info,haltwatch=debug");
        assert!(config.thread_ids);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            ansi: false,
            ..LoggingConfig::default()
        };
        // The first call may lose against another test's subscriber; the
        // second can never succeed.
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::SetSubscriber(_))
        ));
    }

    #[test]
    fn test_encode_metrics() {
        crate::metrics::set_block_height(12);
        let text = encode_metrics().unwrap();
        assert!(text.contains("haltwatch_block_height"));
    }
}
