//! Helpers that tie a subscription's lifetime to an external cleanup scope
//! (a component mount, a request handler, a test body) instead of requiring
//! the caller to remember to call `dispose` manually.

use std::sync::{Arc, Mutex};

use crate::action::{ActionPayload, ActionType, Context};
use crate::bridge::ToSignal;
use crate::bus::{Bus, Subscription};
use crate::options::{BridgeOption, SubOption};
use crate::types::Result;

/// Anything that can be told "run this when I go away". [`Scope`] is the
/// bundled implementation; host applications with their own component
/// lifecycle can implement this directly instead.
pub trait CleanupScope: Send + Sync {
    fn on_cleanup(&self, f: Box<dyn FnOnce() + Send>);
}

/// A standalone cleanup scope: a LIFO stack of deferred closures, run either
/// explicitly via `run_cleanup` or implicitly on `Drop`.
#[derive(Default)]
pub struct Scope {
    cleanups: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").finish_non_exhaustive()
    }
}

impl Scope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run every registered cleanup, most-recently-registered first.
    /// Idempotent: cleanups already run are not run again.
    pub fn run_cleanup(&self) {
        loop {
            let next = self.cleanups.lock().expect("poisoned").pop();
            match next {
                Some(f) => f(),
                None => break,
            }
        }
    }
}

impl CleanupScope for Scope {
    fn on_cleanup(&self, f: Box<dyn FnOnce() + Send>) {
        self.cleanups.lock().expect("poisoned").push(f);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

/// Subscribe a typed handler and register its disposal with `scope`.
pub fn auto_subscribe<T: ActionPayload>(
    bus: &Arc<Bus>,
    scope: &dyn CleanupScope,
    action_type: &ActionType<T>,
    handler: impl Fn(&T, &Context) -> Result<()> + Send + Sync + 'static,
    opts: &[SubOption],
) -> Arc<Subscription> {
    let sub = Arc::new(bus.subscribe(action_type, handler, opts));
    let for_cleanup = sub.clone();
    scope.on_cleanup(Box::new(move || for_cleanup.dispose()));
    sub
}

/// Subscribe an any-handler and register its disposal with `scope`.
pub fn auto_subscribe_any(
    bus: &Arc<Bus>,
    scope: &dyn CleanupScope,
    handler: impl Fn(&crate::action::AnyAction, &Context) -> Result<()> + Send + Sync + 'static,
    opts: &[SubOption],
) -> Arc<Subscription> {
    let sub = Arc::new(bus.subscribe_any(handler, opts));
    let for_cleanup = sub.clone();
    scope.on_cleanup(Box::new(move || for_cleanup.dispose()));
    sub
}

/// Builder for a typed subscription, reading a little more fluently than
/// the raw `SubOption` slice at call sites with several options.
pub struct OnAction<'a, T> {
    bus: &'a Arc<Bus>,
    action_type: ActionType<T>,
    opts: Vec<SubOption>,
}

impl<'a, T: ActionPayload> OnAction<'a, T> {
    pub fn new(bus: &'a Arc<Bus>, action_type: ActionType<T>) -> Self {
        Self {
            bus,
            action_type,
            opts: Vec::new(),
        }
    }

    pub fn priority(mut self, n: i32) -> Self {
        self.opts.push(crate::options::sub_with_priority(n));
        self
    }

    pub fn once(mut self) -> Self {
        self.opts.push(crate::options::sub_once());
        self
    }

    pub fn call(self, handler: impl Fn(&T, &Context) -> Result<()> + Send + Sync + 'static) -> Subscription {
        self.bus.subscribe(&self.action_type, handler, &self.opts)
    }

    pub fn in_scope(
        self,
        scope: &dyn CleanupScope,
        handler: impl Fn(&T, &Context) -> Result<()> + Send + Sync + 'static,
    ) -> Arc<Subscription> {
        let Self { bus, action_type, opts } = self;
        auto_subscribe(bus, scope, &action_type, handler, &opts)
    }
}

/// Bridge an action type onto a signal whose disposal is tied to `scope`.
pub fn use_action_signal<T: ActionPayload>(
    bus: &Arc<Bus>,
    scope: &dyn CleanupScope,
    action_type: &ActionType<T>,
    opts: &[BridgeOption<T>],
) -> Result<Arc<ToSignal<T>>> {
    let bridge = Arc::new(bus.to_signal(action_type, opts)?);
    let for_cleanup = bridge.clone();
    scope.on_cleanup(Box::new(move || for_cleanup.dispose()));
    Ok(bridge)
}
