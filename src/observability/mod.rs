//! Dev-log tap, per-type debug ring buffers, analytics tap, and the
//! enhanced error hook — the observability instrumentation wrapped around
//! every dispatch.

mod ring;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::action::Context;
use crate::types::{Error, TraceId};
use ring::RingBuffer;

/// Initialize the global `tracing` subscriber once for the process.
///
/// Format defaults to plain text; `ACTION_BUS_LOG_FORMAT=json` switches to
/// JSON. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    static TRACING_INIT: OnceLock<()> = OnceLock::new();
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("ACTION_BUS_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

/// One record per dispatch, fed to the dev-log handler.
#[derive(Debug, Clone)]
pub struct DevLogEntry {
    pub action_type: String,
    pub trace_id: TraceId,
    pub source: String,
    pub subscriber_count: usize,
    pub duration: Duration,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub type DevLogHandler = Arc<dyn Fn(&DevLogEntry) + Send + Sync>;

/// One record per dispatch, retained in the per-type ring buffer.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub action_type: String,
    pub trace_id: TraceId,
    pub source: String,
    pub time: DateTime<Utc>,
    pub meta: HashMap<String, serde_json::Value>,
}

/// Emitted by an analytics tap for every action that passes its filter.
#[derive(Debug, Clone)]
pub struct AnalyticsEvent {
    pub action_type: String,
    pub trace_id: TraceId,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub meta: HashMap<String, serde_json::Value>,
}

/// `(Context, error, recovered) -> ()`, invoked on every handler panic or
/// handler-returned error. Never called from inside the failing handler's
/// stack frame (the dispatch loop invokes it after `catch_unwind` returns).
pub type EnhancedErrorHook = Arc<dyn Fn(&Context, &Error, Option<&str>) + Send + Sync>;

/// Legacy `(Context, error) -> ()` hook, inherited by child scopes (the
/// enhanced hook is not).
pub type ErrorHook = Arc<dyn Fn(&Context, &Error) + Send + Sync>;

/// Point-in-time snapshot returned by `Bus::observability_stats`.
#[derive(Debug, Clone)]
pub struct ObservabilityStats {
    pub dev_log_enabled: bool,
    pub ring_buffer_size: usize,
    pub ring_buffer_types: Vec<String>,
}

/// One per bus, lazily meaningful on first observability call (the fields
/// themselves are always allocated; "lazy" refers to no work happening
/// until a dispatch or admin call touches them).
#[derive(Default)]
pub struct ObservabilityManager {
    dev_log_enabled: AtomicBool,
    dev_log_handler: Mutex<Option<DevLogHandler>>,
    ring_buffer_size: AtomicUsize,
    ring_buffers: Mutex<HashMap<String, RingBuffer<ActionRecord>>>,
}

impl std::fmt::Debug for ObservabilityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityManager")
            .field("dev_log_enabled", &self.dev_log_enabled.load(Ordering::Relaxed))
            .field("ring_buffer_size", &self.ring_buffer_size.load(Ordering::Relaxed))
            .finish()
    }
}

impl ObservabilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_dev_logger(&self, handler: DevLogHandler) {
        *self.dev_log_handler.lock().expect("poisoned") = Some(handler);
        self.dev_log_enabled.store(true, Ordering::Release);
    }

    pub fn disable_dev_logger(&self) {
        self.dev_log_enabled.store(false, Ordering::Release);
        *self.dev_log_handler.lock().expect("poisoned") = None;
    }

    pub fn is_dev_log_enabled(&self) -> bool {
        self.dev_log_enabled.load(Ordering::Acquire)
    }

    pub fn record_dev_log(&self, entry: DevLogEntry) {
        if !self.is_dev_log_enabled() {
            return;
        }
        if let Some(handler) = self.dev_log_handler.lock().expect("poisoned").as_ref() {
            handler(&entry);
        }
    }

    /// Resizing clears all existing per-type buffers.
    pub fn enable_ring_buffer(&self, size: usize) {
        self.ring_buffer_size.store(size, Ordering::Release);
        self.ring_buffers.lock().expect("poisoned").clear();
    }

    pub fn record_ring_buffer(&self, record: ActionRecord) {
        let size = self.ring_buffer_size.load(Ordering::Acquire);
        if size == 0 {
            return;
        }
        let mut buffers = self.ring_buffers.lock().expect("poisoned");
        buffers
            .entry(record.action_type.clone())
            .or_insert_with(|| RingBuffer::new(size))
            .push(record);
    }

    pub fn ring_buffer_entries(&self, action_type: &str) -> Vec<ActionRecord> {
        self.ring_buffers
            .lock()
            .expect("poisoned")
            .get(action_type)
            .map(|rb| rb.entries())
            .unwrap_or_default()
    }

    pub fn clear_ring_buffer(&self, action_type: &str) {
        if let Some(rb) = self.ring_buffers.lock().expect("poisoned").get_mut(action_type) {
            rb.clear();
        }
    }

    pub fn stats(&self) -> ObservabilityStats {
        let buffers = self.ring_buffers.lock().expect("poisoned");
        ObservabilityStats {
            dev_log_enabled: self.is_dev_log_enabled(),
            ring_buffer_size: self.ring_buffer_size.load(Ordering::Acquire),
            ring_buffer_types: buffers.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_disabled_by_default() {
        let mgr = ObservabilityManager::new();
        mgr.record_ring_buffer(ActionRecord {
            action_type: "t".into(),
            trace_id: TraceId::new(),
            source: String::new(),
            time: Utc::now(),
            meta: HashMap::new(),
        });
        assert!(mgr.ring_buffer_entries("t").is_empty());
    }

    #[test]
    fn clearing_one_type_does_not_affect_another() {
        let mgr = ObservabilityManager::new();
        mgr.enable_ring_buffer(3);
        for t in ["a", "b"] {
            mgr.record_ring_buffer(ActionRecord {
                action_type: t.into(),
                trace_id: TraceId::new(),
                source: String::new(),
                time: Utc::now(),
                meta: HashMap::new(),
            });
        }
        mgr.clear_ring_buffer("a");
        assert!(mgr.ring_buffer_entries("a").is_empty());
        assert_eq!(mgr.ring_buffer_entries("b").len(), 1);
    }

    #[test]
    fn dev_log_only_fires_when_enabled() {
        let mgr = ObservabilityManager::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        mgr.enable_dev_logger(Arc::new(move |_| fired2.store(true, Ordering::SeqCst)));
        mgr.record_dev_log(DevLogEntry {
            action_type: "t".into(),
            trace_id: TraceId::new(),
            source: String::new(),
            subscriber_count: 0,
            duration: Duration::from_millis(1),
            error: None,
            timestamp: Utc::now(),
        });
        assert!(fired.load(Ordering::SeqCst));

        mgr.disable_dev_logger();
        fired.store(false, Ordering::SeqCst);
        mgr.record_dev_log(DevLogEntry {
            action_type: "t".into(),
            trace_id: TraceId::new(),
            source: String::new(),
            subscriber_count: 0,
            duration: Duration::from_millis(1),
            error: None,
            timestamp: Utc::now(),
        });
        assert!(!fired.load(Ordering::SeqCst));
    }
}
