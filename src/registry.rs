//! Per-bus ordered subscriber storage: the `SubscriptionEntry` record and
//! the ordering rule dispatch uses to build a delivery snapshot.

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::action::{Context, Payload};
use crate::types::{Result, SubscriptionId};

/// Dedup state attached to an entry with `SubDistinctUntilChanged`.
#[derive(Clone)]
pub(crate) struct Dedup {
    pub equality: Option<Arc<dyn Fn(&Payload, &Payload) -> bool + Send + Sync>>,
    pub last: Arc<Mutex<Option<Payload>>>,
}

impl Dedup {
    pub fn new(equality: Option<Arc<dyn Fn(&Payload, &Payload) -> bool + Send + Sync>>) -> Self {
        Self {
            equality,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns `true` if this payload is a duplicate of the last seen one
    /// (and should therefore be skipped), recording it otherwise.
    pub fn check_and_record(&self, payload: &Payload) -> bool {
        let mut last = self.last.lock().expect("dedup mutex poisoned");
        let is_dup = match last.as_ref() {
            Some(prev) => match &self.equality {
                Some(eq) => eq(prev, payload),
                None => prev == payload,
            },
            None => false,
        };
        if !is_dup {
            *last = Some(payload.clone());
        }
        is_dup
    }
}

/// A single point of truth for whether a delivery occurs: identity,
/// ordering key, and the filter/gate/dedup pipeline, plus the type-erased
/// callback that performs the actual downcast-and-invoke.
#[derive(Clone)]
pub(crate) struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub active: Arc<AtomicBool>,
    pub once: bool,
    pub gate: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    pub filter: Option<Arc<dyn Fn(&Payload) -> bool + Send + Sync>>,
    pub dedup: Option<Dedup>,
    #[allow(clippy::type_complexity)]
    pub invoke: Arc<dyn Fn(&(dyn Any + Send + Sync), &Context) -> Result<()> + Send + Sync>,
}

impl SubscriptionEntry {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Runs the gate → filter → dedup pipeline. Returns `true` if delivery
    /// should proceed.
    pub fn passes_pipeline(&self, payload: &Payload) -> bool {
        if let Some(gate) = &self.gate {
            if !gate() {
                return false;
            }
        }
        if let Some(filter) = &self.filter {
            if !filter(payload) {
                return false;
            }
        }
        if let Some(dedup) = &self.dedup {
            if dedup.check_and_record(payload) {
                return false;
            }
        }
        true
    }
}

/// Stable sort by priority descending, then creation time ascending (FIFO
/// among equal priorities). `Vec::sort_by` is a stable sort, so entries
/// registered at the exact same instant keep registration order.
pub(crate) fn ordering_key(a: &SubscriptionEntry, b: &SubscriptionEntry) -> CmpOrdering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Snapshot the active entries of a list, in delivery order.
pub(crate) fn ordered_snapshot(entries: &[SubscriptionEntry]) -> Vec<SubscriptionEntry> {
    let mut snapshot: Vec<SubscriptionEntry> =
        entries.iter().filter(|e| e.is_active()).cloned().collect();
    snapshot.sort_by(ordering_key);
    snapshot
}
