//! Functional options for dispatch, subscription, query, ask, and bridge
//! construction. Each `With*`/`Sub*`/`Query*`/`Ask*`/`Bridge*` constructor
//! builds one enum variant; callers pass a slice, e.g.
//! `bus.dispatch(action, &[with_trace(id), with_async()])`.

use std::sync::Arc;
use std::time::Duration;

use crate::action::{Context, Payload};
use crate::bridge::signal::{BoolSignal, ItemSource};
use crate::query::ConcurrencyPolicy;
use crate::stream::DropPolicy;
use crate::types::TraceId;

// ---------------------------------------------------------------- Dispatch

pub enum DispatchOption {
    WithTimeout(Duration),
    WithContext(Context),
    WithMeta(std::collections::HashMap<String, serde_json::Value>),
    WithTrace(TraceId),
    WithSource(String),
    WithAsync,
}

pub fn with_timeout(d: Duration) -> DispatchOption {
    DispatchOption::WithTimeout(d)
}
pub fn with_context(ctx: Context) -> DispatchOption {
    DispatchOption::WithContext(ctx)
}
pub fn with_meta(meta: std::collections::HashMap<String, serde_json::Value>) -> DispatchOption {
    DispatchOption::WithMeta(meta)
}
pub fn with_trace(id: TraceId) -> DispatchOption {
    DispatchOption::WithTrace(id)
}
pub fn with_source(source: impl Into<String>) -> DispatchOption {
    DispatchOption::WithSource(source.into())
}
pub fn with_async() -> DispatchOption {
    DispatchOption::WithAsync
}

// ------------------------------------------------------------ Subscription

pub enum SubOption {
    Priority(i32),
    Once,
    Filter(Arc<dyn Fn(&Payload) -> bool + Send + Sync>),
    When(Arc<dyn Fn() -> bool + Send + Sync>),
    DistinctUntilChanged(Option<Arc<dyn Fn(&Payload, &Payload) -> bool + Send + Sync>>),
}

pub fn sub_with_priority(n: i32) -> SubOption {
    SubOption::Priority(n)
}
pub fn sub_once() -> SubOption {
    SubOption::Once
}
pub fn sub_filter(pred: impl Fn(&Payload) -> bool + Send + Sync + 'static) -> SubOption {
    SubOption::Filter(Arc::new(pred))
}
pub fn sub_when(gate: impl Fn() -> bool + Send + Sync + 'static) -> SubOption {
    SubOption::When(Arc::new(gate))
}

/// Build a `SubOption::When` gate from a live `BoolSignal` rather than a
/// one-off predicate closure: the gate re-reads the signal's current value
/// on every dispatch instead of capturing it once at subscribe time.
pub fn sub_when_signal(signal: &BoolSignal) -> SubOption {
    let source = ItemSource::Signal(signal.clone());
    SubOption::When(Arc::new(move || source.resolve()))
}
pub fn sub_distinct_until_changed(
    eq: Option<impl Fn(&Payload, &Payload) -> bool + Send + Sync + 'static>,
) -> SubOption {
    SubOption::DistinctUntilChanged(eq.map(|f| Arc::new(f) as Arc<_>))
}

// -------------------------------------------------------------------- Ask

pub enum AskOption {
    Timeout(Duration),
    Context(Context),
    Priority(i32),
    TraceId(TraceId),
    Meta(std::collections::HashMap<String, serde_json::Value>),
    Source(String),
}

pub fn ask_with_timeout(d: Duration) -> AskOption {
    AskOption::Timeout(d)
}
pub fn ask_with_context(ctx: Context) -> AskOption {
    AskOption::Context(ctx)
}
pub fn ask_with_priority(n: i32) -> AskOption {
    AskOption::Priority(n)
}
pub fn ask_with_trace_id(id: TraceId) -> AskOption {
    AskOption::TraceId(id)
}
pub fn ask_with_meta(meta: std::collections::HashMap<String, serde_json::Value>) -> AskOption {
    AskOption::Meta(meta)
}
pub fn ask_with_source(source: impl Into<String>) -> AskOption {
    AskOption::Source(source.into())
}

// ------------------------------------------------------------------- Query

pub enum QueryOption {
    Timeout(Duration),
    Priority(i32),
    ConcurrencyPolicy(ConcurrencyPolicy),
}

pub fn query_with_timeout(d: Duration) -> QueryOption {
    QueryOption::Timeout(d)
}
pub fn query_with_priority(n: i32) -> QueryOption {
    QueryOption::Priority(n)
}
pub fn query_with_concurrency_policy(policy: ConcurrencyPolicy) -> QueryOption {
    QueryOption::ConcurrencyPolicy(policy)
}

// ------------------------------------------------------------------ Bridge

pub enum BridgeOption<T> {
    Filter(Arc<dyn Fn(&Payload) -> bool + Send + Sync>),
    Transform(Arc<dyn Fn(Payload) -> Option<T> + Send + Sync>),
    InitialValue(T),
    DistinctUntilChanged(Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>),
    BufferSize(usize),
    DropPolicy(DropPolicy),
}

pub fn bridge_with_filter<T>(pred: impl Fn(&Payload) -> bool + Send + Sync + 'static) -> BridgeOption<T> {
    BridgeOption::Filter(Arc::new(pred))
}
pub fn bridge_with_transform<T>(
    f: impl Fn(Payload) -> Option<T> + Send + Sync + 'static,
) -> BridgeOption<T> {
    BridgeOption::Transform(Arc::new(f))
}
pub fn bridge_with_initial_value<T>(value: T) -> BridgeOption<T> {
    BridgeOption::InitialValue(value)
}
pub fn bridge_with_distinct_until_changed<T>(
    eq: Option<impl Fn(&T, &T) -> bool + Send + Sync + 'static>,
) -> BridgeOption<T> {
    BridgeOption::DistinctUntilChanged(eq.map(|f| Arc::new(f) as Arc<_>))
}
pub fn bridge_with_buffer_size<T>(n: usize) -> BridgeOption<T> {
    BridgeOption::BufferSize(n)
}
pub fn bridge_with_drop_policy<T>(policy: DropPolicy) -> BridgeOption<T> {
    BridgeOption::DropPolicy(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::bus::Bus;
    use crate::types::BusConfig;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn sub_when_signal_gates_on_the_signals_current_value() {
        let bus = Bus::new(BusConfig::default());
        let action_type: ActionType<i32> = ActionType::new("gated");
        let gate = BoolSignal::new(false);
        let count = Arc::new(AtomicI32::new(0));
        let c = count.clone();
        bus.subscribe(&action_type, move |_v, _c| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }, &[sub_when_signal(&gate)]);

        bus.dispatch(&action_type, 1, &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0, "gate starts closed");

        gate.set(true);
        bus.dispatch(&action_type, 1, &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1, "gate now open");
    }
}
