//! BusConfig - Config Loader output
//!
//! Dispatcher tuning plus logging settings for binaries embedding the bus.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete bus configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Asynchronous dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Asynchronous dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound on how long an idle worker sleeps before rechecking (milliseconds)
    pub poll_interval_ms: u64,

    /// Deliver everything still queued before the worker exits on stop
    pub drain_on_stop: bool,

    /// What the worker does when a handler fails
    pub failure_policy: HandlerFailurePolicy,

    /// Worker thread name
    pub worker_name: String,
}

impl DispatcherConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            drain_on_stop: false,
            failure_policy: HandlerFailurePolicy::default(),
            worker_name: "msg-dispatcher".to_string(),
        }
    }
}

/// Handler failure policy for the asynchronous worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerFailurePolicy {
    /// Log the failure and keep delivering
    #[default]
    LogAndContinue,
    /// Log the failure, requeue the rest of the batch and stop the worker
    StopWorker,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,

    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Prometheus exporter port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            metrics_port: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human-readable multi-line format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
