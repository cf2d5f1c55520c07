//! The bus itself: scoped subscriber registries, the dispatch algorithm,
//! error hooks, and the observability admin surface delegated to
//! [`ObservabilityManager`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::action::{Action, ActionPayload, ActionType, AnyAction, Context, Payload};
use crate::observability::{
    ActionRecord, AnalyticsEvent, DevLogEntry, DevLogHandler, EnhancedErrorHook, ErrorHook,
    ObservabilityManager, ObservabilityStats,
};
use crate::options::{DispatchOption, SubOption};
use crate::query::QueryHandlerEntry;
use crate::registry::{ordered_snapshot, Dedup, SubscriptionEntry};
use crate::types::{BusConfig, Error, Result, SubscriptionId, TraceId};

/// An in-process, typed action bus with scoped child buses, any-handlers,
/// and a request/response query engine.
pub struct Bus {
    scope: String,
    weak_self: Weak<Bus>,
    #[allow(dead_code)]
    parent: Option<Weak<Bus>>,
    subscribers: RwLock<HashMap<String, Vec<SubscriptionEntry>>>,
    any_handlers: RwLock<Vec<SubscriptionEntry>>,
    pub(crate) query_handlers: RwLock<HashMap<String, Arc<QueryHandlerEntry>>>,
    error_hook: Mutex<Option<ErrorHook>>,
    enhanced_error_hook: Mutex<Option<EnhancedErrorHook>>,
    observability: ObservabilityManager,
    pub(crate) config: BusConfig,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").field("scope", &self.scope).finish_non_exhaustive()
    }
}

impl Bus {
    /// Create a root bus. Applies `config.observability`'s defaults (dev
    /// logger, ring buffer size) before returning.
    pub fn new(config: BusConfig) -> Arc<Bus> {
        crate::observability::init_tracing();
        Arc::new_cyclic(|weak_self| {
            let observability = ObservabilityManager::new();
            if config.observability.dev_log_default_on {
                observability.enable_dev_logger(default_dev_log_handler());
            }
            if config.observability.ring_buffer_default_size > 0 {
                observability.enable_ring_buffer(config.observability.ring_buffer_default_size);
            }
            Bus {
                scope: "root".to_string(),
                weak_self: weak_self.clone(),
                parent: None,
                subscribers: RwLock::new(HashMap::new()),
                any_handlers: RwLock::new(Vec::new()),
                query_handlers: RwLock::new(HashMap::new()),
                error_hook: Mutex::new(None),
                enhanced_error_hook: Mutex::new(None),
                observability,
                config,
            }
        })
    }

    /// Create a namespaced child bus. Its scope path is `"{parent}/{name}"`.
    /// The legacy error hook is inherited; the enhanced error hook, dev
    /// logger, and ring buffers are not.
    pub fn child(self: &Arc<Self>, name: impl Into<String>) -> Arc<Bus> {
        let scope = format!("{}/{}", self.scope, name.into());
        let inherited_hook = self.error_hook.lock().expect("poisoned").clone();
        let config = self.config.clone();
        Arc::new_cyclic(|weak_self| Bus {
            scope,
            weak_self: weak_self.clone(),
            parent: Some(Arc::downgrade(self)),
            subscribers: RwLock::new(HashMap::new()),
            any_handlers: RwLock::new(Vec::new()),
            query_handlers: RwLock::new(HashMap::new()),
            error_hook: Mutex::new(inherited_hook),
            enhanced_error_hook: Mutex::new(None),
            observability: ObservabilityManager::new(),
            config,
        })
    }

    pub fn scope_path(&self) -> &str {
        &self.scope
    }

    pub fn on_error(&self, hook: ErrorHook) {
        *self.error_hook.lock().expect("poisoned") = Some(hook);
    }

    pub fn clear_error_handler(&self) {
        *self.error_hook.lock().expect("poisoned") = None;
    }

    pub fn set_enhanced_error_handler(&self, hook: EnhancedErrorHook) {
        *self.enhanced_error_hook.lock().expect("poisoned") = Some(hook);
    }

    pub fn clear_enhanced_error_handler(&self) {
        *self.enhanced_error_hook.lock().expect("poisoned") = None;
    }

    fn report_error(&self, ctx: &Context, err: &Error, recovered: Option<&str>) {
        if let Some(hook) = self.enhanced_error_hook.lock().expect("poisoned").as_ref() {
            hook(ctx, err, recovered);
        }
        if let Some(hook) = self.error_hook.lock().expect("poisoned").as_ref() {
            hook(ctx, err);
        }
    }

    // ------------------------------------------------------------ Subscribe

    /// Subscribe a typed handler to an action type. Delivery is zero-copy:
    /// the handler receives `&T` downcast from the dispatched `Action<T>`,
    /// never a JSON round trip.
    pub fn subscribe<T: ActionPayload>(
        self: &Arc<Self>,
        action_type: &ActionType<T>,
        handler: impl Fn(&T, &Context) -> Result<()> + Send + Sync + 'static,
        opts: &[SubOption],
    ) -> Subscription {
        let (priority, once, gate, filter, dedup) = parse_sub_options(opts);
        let active = Arc::new(AtomicBool::new(true));
        let id = SubscriptionId::new();

        let invoke: std::sync::Arc<
            dyn Fn(&(dyn Any + Send + Sync), &Context) -> Result<()> + Send + Sync,
        > = Arc::new(move |any, ctx| {
            let action = any
                .downcast_ref::<Action<T>>()
                .expect("subscriber invoked with mismatched action type");
            handler(&action.payload, ctx)
        });

        let entry = SubscriptionEntry {
            id: id.clone(),
            priority,
            created_at: Utc::now(),
            active: active.clone(),
            once,
            gate,
            filter,
            dedup,
            invoke,
        };

        self.subscribers
            .write()
            .expect("poisoned")
            .entry(action_type.name().to_string())
            .or_default()
            .push(entry);

        Subscription::for_entry(id, active)
    }

    /// Subscribe to every action dispatched on this bus, as a type-erased
    /// [`AnyAction`]. Any-handlers run after all type-specific subscribers
    /// have completed for the same dispatch (two-phase ordering).
    pub fn subscribe_any(
        self: &Arc<Self>,
        handler: impl Fn(&AnyAction, &Context) -> Result<()> + Send + Sync + 'static,
        opts: &[SubOption],
    ) -> Subscription {
        let (priority, once, gate, filter, dedup) = parse_sub_options(opts);
        let active = Arc::new(AtomicBool::new(true));
        let id = SubscriptionId::new();

        let invoke: std::sync::Arc<
            dyn Fn(&(dyn Any + Send + Sync), &Context) -> Result<()> + Send + Sync,
        > = Arc::new(move |any, ctx| {
            let action = any
                .downcast_ref::<AnyAction>()
                .expect("any-handler invoked with non-AnyAction value");
            handler(action, ctx)
        });

        let entry = SubscriptionEntry {
            id: id.clone(),
            priority,
            created_at: Utc::now(),
            active: active.clone(),
            once,
            gate,
            filter,
            dedup,
            invoke,
        };

        self.any_handlers.write().expect("poisoned").push(entry);
        Subscription::for_entry(id, active)
    }

    // ------------------------------------------------------------- Dispatch

    /// Dispatch a typed action. Runs handlers synchronously on the calling
    /// thread unless `DispatchOption::WithAsync` is present, in which case
    /// delivery happens on a spawned task and this call returns immediately.
    pub fn dispatch<T: ActionPayload>(
        self: &Arc<Self>,
        action_type: &ActionType<T>,
        payload: T,
        opts: &[DispatchOption],
    ) -> Result<()> {
        let mut action = Action::new(action_type.name(), payload);
        let (ctx, is_async, timeout) = self.resolve_context(&mut action, opts);

        if is_async {
            let bus = self.clone();
            tokio::spawn(async move {
                if let Err(err) = bus.deliver(action, ctx, timeout) {
                    tracing::debug!(%err, "async dispatch completed with an error");
                }
            });
            Ok(())
        } else {
            self.deliver(action, ctx, timeout)
        }
    }

    /// Dispatch a bare JSON value, auto-wrapped under
    /// [`crate::action::UNKNOWN_ACTION_TYPE`] (spec: "bare values ... are
    /// auto-wrapped with type `unknown`").
    pub fn dispatch_value(
        self: &Arc<Self>,
        value: serde_json::Value,
        opts: &[DispatchOption],
    ) -> Result<()> {
        let action_type = ActionType::<Payload>::new(crate::action::UNKNOWN_ACTION_TYPE);
        self.dispatch(&action_type, Payload(value), opts)
    }

    fn resolve_context<T>(
        &self,
        action: &mut Action<T>,
        opts: &[DispatchOption],
    ) -> (Context, bool, Option<Duration>) {
        let mut ctx = Context::new(self.scope.clone());
        let mut is_async = false;
        let mut timeout = None;

        for opt in opts {
            match opt {
                DispatchOption::WithTimeout(d) => timeout = Some(*d),
                DispatchOption::WithContext(c) => ctx = c.clone(),
                DispatchOption::WithMeta(m) => ctx.meta.extend(m.clone()),
                DispatchOption::WithTrace(id) => ctx.trace_id = id.clone(),
                DispatchOption::WithSource(s) => ctx.source = s.clone(),
                DispatchOption::WithAsync => is_async = true,
            }
        }

        // The action's own explicit trace id/source win over the context
        // defaults; otherwise the context supplies them.
        match &action.trace_id {
            Some(id) => ctx.trace_id = id.clone(),
            None => action.trace_id = Some(ctx.trace_id.clone()),
        }
        if action.source.is_empty() {
            action.source = ctx.source.clone();
        } else {
            ctx.source = action.source.clone();
        }

        // Meta merges in both directions: the context's meta fills in any
        // key the action doesn't already carry, then the action's (now
        // merged) meta is folded back into the context unconditionally, so
        // every observer sees the union of the two.
        if !ctx.meta.is_empty() {
            let action_meta = action.meta.get_or_insert_with(HashMap::new);
            for (k, v) in &ctx.meta {
                action_meta.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        if let Some(action_meta) = &action.meta {
            ctx.meta.extend(action_meta.clone());
        }

        (ctx, is_async, timeout)
    }

    fn deliver<T: ActionPayload>(
        self: &Arc<Self>,
        action: Action<T>,
        ctx: Context,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let start = Instant::now();
        let any_action = action.to_any()?;
        let payload = any_action.payload.clone();

        let type_snapshot = {
            let subs = self.subscribers.read().expect("poisoned");
            subs.get(&action.action_type)
                .map(|v| ordered_snapshot(v))
                .unwrap_or_default()
        };
        let any_snapshot = ordered_snapshot(&self.any_handlers.read().expect("poisoned"));

        let mut delivered = 0usize;
        let mut last_error: Option<Error> = None;

        for entry in &type_snapshot {
            if !entry.passes_pipeline(&payload) {
                continue;
            }
            delivered += 1;
            self.invoke_one(entry, &action, &ctx, &mut last_error);
        }

        for entry in &any_snapshot {
            if !entry.passes_pipeline(&payload) {
                continue;
            }
            delivered += 1;
            self.invoke_one(entry, &any_action, &ctx, &mut last_error);
        }

        let elapsed = start.elapsed();
        // WithTimeout is advisory in the sync path: it sets an intended
        // handler ceiling that gets logged when missed, it never cuts
        // delivery short. Timeout as an enforced, error-producing deadline
        // is a query-engine (`Ask`) concept only.
        if let Some(d) = timeout {
            if elapsed > d {
                tracing::warn!(
                    action_type = %action.action_type,
                    elapsed_us = elapsed.as_micros(),
                    advisory_timeout_us = d.as_micros(),
                    "dispatch exceeded its advisory WithTimeout"
                );
            }
        }

        self.observability.record_ring_buffer(ActionRecord {
            action_type: action.action_type.clone(),
            trace_id: ctx.trace_id.clone(),
            source: action.source.clone(),
            time: action.time,
            meta: action.meta.clone().unwrap_or_default(),
        });
        self.observability.record_dev_log(DevLogEntry {
            action_type: action.action_type.clone(),
            trace_id: ctx.trace_id.clone(),
            source: action.source.clone(),
            subscriber_count: delivered,
            duration: elapsed,
            error: last_error.as_ref().map(|e| e.to_string()),
            timestamp: Utc::now(),
        });

        // Delivery-time errors (a handler returning an error, or panicking)
        // are reported to the error hook and recorded in the dev log above,
        // but never surface through Dispatch's own return value. Only a
        // dispatch-step failure that happens before delivery even starts
        // (e.g. `to_any` failing to serialize the payload, via the `?`
        // above) produces an `Err` here.
        Ok(())
    }

    fn invoke_one<V: Any + Send + Sync>(
        &self,
        entry: &SubscriptionEntry,
        value: &V,
        ctx: &Context,
        last_error: &mut Option<Error>,
    ) {
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (entry.invoke)(value, ctx)));
        let result = match outcome {
            Ok(r) => r,
            Err(payload) => Err(Error::panic(panic_message(&payload))),
        };
        if let Err(err) = &result {
            self.report_error(ctx, err, None);
            *last_error = Some(err.clone());
        }
        if entry.once {
            entry.dispose();
        }
    }

    // ------------------------------------------------------- Observability

    pub fn enable_dev_logger(&self, handler: DevLogHandler) {
        self.observability.enable_dev_logger(handler);
    }

    pub fn disable_dev_logger(&self) {
        self.observability.disable_dev_logger();
    }

    pub fn enable_debug_ring_buffer(&self, size: usize) {
        self.observability.enable_ring_buffer(size);
    }

    pub fn debug_ring_buffer_entries(&self, action_type: &str) -> Vec<ActionRecord> {
        self.observability.ring_buffer_entries(action_type)
    }

    pub fn clear_debug_ring_buffer(&self, action_type: &str) {
        self.observability.clear_ring_buffer(action_type);
    }

    pub fn observability_stats(&self) -> ObservabilityStats {
        self.observability.stats()
    }

    /// Wrap a single any-subscriber as an analytics tap: every action
    /// passing `filter` (or every action, if `None`) is projected into an
    /// [`AnalyticsEvent`] and handed to `on_event`.
    pub fn new_analytics_tap(
        self: &Arc<Self>,
        on_event: impl Fn(AnalyticsEvent) + Send + Sync + 'static,
        filter: Option<std::sync::Arc<dyn Fn(&Payload) -> bool + Send + Sync>>,
    ) -> Subscription {
        let mut opts = Vec::new();
        if let Some(f) = filter {
            opts.push(SubOption::Filter(f));
        }
        self.subscribe_any(
            move |action, _ctx| {
                on_event(AnalyticsEvent {
                    action_type: action.action_type.clone(),
                    trace_id: action.trace_id.clone().unwrap_or_else(TraceId::new),
                    source: action.source.clone(),
                    timestamp: action.time,
                    meta: action.meta.clone().unwrap_or_default(),
                });
                Ok(())
            },
            &opts,
        )
    }

    pub(crate) fn weak(self: &Arc<Self>) -> Weak<Bus> {
        self.weak_self.clone()
    }

    pub(crate) fn config_defaults(&self) -> crate::types::DefaultLimits {
        self.config.defaults.clone()
    }
}

fn default_dev_log_handler() -> DevLogHandler {
    Arc::new(|entry: &DevLogEntry| {
        tracing::info!(
            action_type = %entry.action_type,
            trace_id = %entry.trace_id,
            subscribers = entry.subscriber_count,
            duration_us = entry.duration.as_micros(),
            error = entry.error.as_deref(),
            "dispatch"
        );
    })
}

#[allow(clippy::type_complexity)]
fn parse_sub_options(
    opts: &[SubOption],
) -> (
    i32,
    bool,
    Option<std::sync::Arc<dyn Fn() -> bool + Send + Sync>>,
    Option<std::sync::Arc<dyn Fn(&Payload) -> bool + Send + Sync>>,
    Option<Dedup>,
) {
    let mut priority = 0;
    let mut once = false;
    let mut gate = None;
    let mut filter = None;
    let mut dedup = None;
    for opt in opts {
        match opt {
            SubOption::Priority(p) => priority = *p,
            SubOption::Once => once = true,
            SubOption::Filter(f) => filter = Some(f.clone()),
            SubOption::When(g) => gate = Some(g.clone()),
            SubOption::DistinctUntilChanged(eq) => dedup = Some(Dedup::new(eq.clone())),
        }
    }
    (priority, once, gate, filter, dedup)
}

/// Stringify a `catch_unwind` panic payload; most panics carry `&str` or
/// `String`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

enum SubscriptionKind {
    Entry(std::sync::Arc<AtomicBool>),
    Query { bus: Weak<Bus>, name: String },
}

/// A handle returned by `subscribe`/`subscribe_any`/`handle_query`. Dropping
/// it does **not** unsubscribe — call [`Subscription::dispose`] explicitly.
/// Subscriptions are disposed, not RAII-scoped, so they can outlive the
/// call site that created them.
pub struct Subscription {
    id: SubscriptionId,
    kind: SubscriptionKind,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    pub(crate) fn for_entry(id: SubscriptionId, active: std::sync::Arc<AtomicBool>) -> Self {
        Self {
            id,
            kind: SubscriptionKind::Entry(active),
        }
    }

    pub(crate) fn for_query(bus: Weak<Bus>, name: String) -> Self {
        Self {
            id: SubscriptionId::new(),
            kind: SubscriptionKind::Query { bus, name },
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        match &self.kind {
            SubscriptionKind::Entry(active) => active.load(Ordering::Acquire),
            SubscriptionKind::Query { bus, name } => bus
                .upgrade()
                .map(|b| b.query_handlers.read().expect("poisoned").contains_key(name))
                .unwrap_or(false),
        }
    }

    /// Idempotent: disposing twice, or disposing after the owning bus has
    /// been dropped, is a no-op.
    pub fn dispose(&self) {
        match &self.kind {
            SubscriptionKind::Entry(active) => active.store(false, Ordering::Release),
            SubscriptionKind::Query { bus, name } => {
                if let Some(bus) = bus.upgrade() {
                    if let Some(entry) = bus.query_handlers.write().expect("poisoned").remove(name)
                    {
                        crate::query::cancel_query_handler(&entry);
                    }
                }
            }
        }
    }
}
