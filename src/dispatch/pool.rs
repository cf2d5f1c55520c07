//! Stub shape for a worker-pool-accelerated dispatch path.
//!
//! Nothing in the crate constructs a `DispatchPool` today — `Bus::dispatch`
//! and `Bus::ask` always run delivery on the calling thread or a single
//! spawned task. `PoolConfig`/`DispatchPool` exist so that knob has a stable
//! name and shape to grow into rather than being invented ad hoc later.

use std::sync::Arc;

use crate::action::AnyAction;
use crate::types::Result;

/// What a pool does with a dispatch that arrives once every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Block the caller until a worker frees up.
    Block,
    /// Run the dispatch on the calling thread instead of queueing it.
    RunInline,
    /// Reject the dispatch immediately.
    Reject,
}

/// Sizing and overflow behavior for a [`DispatchPool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

/// A dispatch sink backed by a fixed worker set.
///
/// Not implemented by the default `Bus` — see the module docs.
pub trait DispatchPool: Send + Sync {
    fn config(&self) -> PoolConfig;
    fn submit(&self, action: Arc<AnyAction>) -> Result<()>;
}
