//! Bridges project the dispatched-action stream onto two familiar
//! abstractions: a [`signal::Signal`] (latest value, read any time, observed
//! on change) and a [`crate::stream::Stream`] (a bounded FIFO of items).
//! Both run the same filter → transform pipeline; the signal additionally
//! applies distinct-until-changed before assigning.

pub mod signal;

use std::sync::Arc;

use serde::Serialize;

use crate::action::{ActionPayload, ActionType, Payload};
use crate::bus::{Bus, Subscription};
use crate::options::BridgeOption;
use crate::stream::{DropPolicy, Stream};
use crate::types::{Error, Result};
use signal::Signal;

type FilterFn = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;

struct BridgeSpec<T> {
    filter: Option<FilterFn>,
    transform: Option<Arc<dyn Fn(Payload) -> Option<T> + Send + Sync>>,
}

impl<T: ActionPayload> BridgeSpec<T> {
    fn project(&self, action_type_name: &str, action: &crate::action::AnyAction) -> Option<T> {
        if action.action_type != action_type_name {
            return None;
        }
        if let Some(filter) = &self.filter {
            if !filter(&action.payload) {
                return None;
            }
        }
        match &self.transform {
            Some(f) => f(action.payload.clone()),
            None => action.payload.deserialize::<T>().ok(),
        }
    }
}

/// A signal kept in sync with one action type's payload stream.
pub struct ToSignal<T: Clone + Send + Sync + 'static> {
    signal: Signal<T>,
    subscription: Subscription,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for ToSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToSignal").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> ToSignal<T> {
    pub fn get(&self) -> T {
        self.signal.get()
    }

    pub fn on_change(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        self.signal.on_change(f);
    }

    pub fn dispose(&self) {
        self.subscription.dispose();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

/// A bounded stream kept fed from one action type's payload stream.
pub struct ToStream<T: Send + 'static> {
    stream: Stream<T>,
}

impl<T: Send + 'static> std::fmt::Debug for ToStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToStream").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ToStream<T> {
    pub fn capacity(&self) -> usize {
        self.stream.capacity()
    }

    pub fn recv(&self) -> Result<T> {
        self.stream.recv().map_err(|_| Error::disposed("stream"))
    }

    pub fn try_recv(&self) -> Option<T> {
        self.stream.try_recv().ok()
    }

    pub fn dispose(&self) {
        self.stream.dispose();
    }
}

impl Bus {
    /// Bridge an action type onto a [`Signal`]. Requires
    /// `BridgeOption::InitialValue` — a signal always has a current value.
    pub fn to_signal<T: ActionPayload>(
        self: &Arc<Self>,
        action_type: &ActionType<T>,
        opts: &[BridgeOption<T>],
    ) -> Result<ToSignal<T>> {
        let (spec, initial, dedup) = split_bridge_opts(opts);
        let initial = initial.ok_or_else(|| {
            Error::internal("to_signal requires BridgeOption::InitialValue")
        })?;

        let signal = Signal::new(initial);
        let signal_for_closure = signal.clone();
        let action_type_name = action_type.name().to_string();

        let subscription = self.subscribe_any(
            move |action, _ctx| {
                let Some(value) = spec.project(&action_type_name, action) else {
                    return Ok(());
                };
                if let Some(eq) = &dedup {
                    let current = signal_for_closure.get();
                    if eq(&current, &value) {
                        return Ok(());
                    }
                }
                signal_for_closure.set(value);
                Ok(())
            },
            &[],
        );

        Ok(ToSignal { signal, subscription })
    }

    /// Bridge an action type onto a bounded [`Stream`].
    pub fn to_stream<T: ActionPayload>(
        self: &Arc<Self>,
        action_type: &ActionType<T>,
        opts: &[BridgeOption<T>],
    ) -> ToStream<T> {
        let (spec, _initial, _dedup) = split_bridge_opts(opts);
        let mut buffer_size = self.defaults().bridge_buffer_size;
        let mut drop_policy = DropPolicy::DropOldest;
        for opt in opts {
            match opt {
                BridgeOption::BufferSize(n) => buffer_size = *n,
                BridgeOption::DropPolicy(p) => drop_policy = *p,
                _ => {}
            }
        }
        // A caller-specified buffer size of 0 (or the default falling back
        // to 0) means "unspecified" rather than "no capacity" — fall back
        // to 10, not `Stream::new`'s own capacity-1 floor.
        if buffer_size == 0 {
            buffer_size = 10;
        }

        let stream = Stream::new(buffer_size, drop_policy);
        let stream_for_closure = stream.clone();
        let action_type_name = action_type.name().to_string();

        let subscription = self.subscribe_any(
            move |action, _ctx| {
                if let Some(value) = spec.project(&action_type_name, action) {
                    stream_for_closure.push(value);
                }
                Ok(())
            },
            &[],
        );

        stream.set_on_dispose(move || subscription.dispose());
        ToStream { stream }
    }

    fn defaults(&self) -> crate::types::DefaultLimits {
        self.config_defaults()
    }
}

#[allow(clippy::type_complexity)]
fn split_bridge_opts<T: ActionPayload>(
    opts: &[BridgeOption<T>],
) -> (
    BridgeSpec<T>,
    Option<T>,
    Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>,
) {
    let mut filter = None;
    let mut transform = None;
    let mut initial = None;
    let mut dedup = None;
    for opt in opts {
        match opt {
            BridgeOption::Filter(f) => filter = Some(f.clone()),
            BridgeOption::Transform(f) => transform = Some(f.clone()),
            BridgeOption::InitialValue(v) => initial = Some(v.clone()),
            BridgeOption::DistinctUntilChanged(eq) => {
                dedup = Some(eq.clone().unwrap_or_else(|| {
                    Arc::new(|a: &T, b: &T| serialize_for_eq(a) == serialize_for_eq(b))
                        as Arc<dyn Fn(&T, &T) -> bool + Send + Sync>
                }));
            }
            BridgeOption::BufferSize(_) | BridgeOption::DropPolicy(_) => {}
        }
    }
    (BridgeSpec { filter, transform }, initial, dedup)
}

fn serialize_for_eq<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::options::bridge_with_buffer_size;
    use crate::types::BusConfig;

    #[test]
    fn explicit_zero_buffer_size_falls_back_to_ten() {
        let bus = Bus::new(BusConfig::default());
        let action_type: ActionType<i32> = ActionType::new("zero-buffered");
        let bridge = bus.to_stream(&action_type, &[bridge_with_buffer_size(0)]);
        assert_eq!(bridge.capacity(), 10);
    }

    #[test]
    fn unspecified_buffer_size_uses_the_bus_default() {
        let bus = Bus::new(BusConfig::default());
        let action_type: ActionType<i32> = ActionType::new("default-buffered");
        let bridge = bus.to_stream(&action_type, &[]);
        assert_eq!(bridge.capacity(), 10);
    }
}
