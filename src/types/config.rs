//! Configuration structures.
//!
//! `BusConfig` holds the defaults new buses and bridges are created with. It
//! is plain data so a host application can embed it in its own config file
//! and deserialize with `serde`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusConfig {
    /// Observability defaults (dev log, ring buffer).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Defaults applied when a query or bridge doesn't specify its own.
    #[serde(default)]
    pub defaults: DefaultLimits,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,

    /// Whether the dev log tap is enabled by default on a freshly created bus.
    pub dev_log_default_on: bool,

    /// Default per-type ring buffer size (0 disables ring buffers until
    /// `EnableDebugRingBuffer` is called explicitly).
    pub ring_buffer_default_size: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            dev_log_default_on: false,
            ring_buffer_default_size: 0,
        }
    }
}

/// Defaults for queries and bridges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLimits {
    /// Default bridge buffer size used when `BridgeWithBufferSize` is omitted.
    pub bridge_buffer_size: usize,

    /// Default query timeout, applied when `QueryWithTimeout`/`AskWithTimeout`
    /// is omitted. `None` means queries never time out unless asked to.
    #[serde(with = "humantime_serde::option")]
    pub query_timeout: Option<Duration>,
}

impl Default for DefaultLimits {
    fn default() -> Self {
        Self {
            bridge_buffer_size: 10,
            query_timeout: None,
        }
    }
}
