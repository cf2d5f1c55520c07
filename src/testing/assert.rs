//! Test-only assertion helpers: comparing actions while ignoring the
//! fields that legitimately vary per instance (timestamp, trace id, action
//! id), and a subscriber that records what it received instead of asserting
//! inline.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq as pretty_assert_eq;

use std::time::Duration;

use crate::action::{Action, ActionPayload, ActionType, Context};
use crate::bus::{Bus, Subscription};
use crate::options::SubOption;
use crate::testing::clock::FakeClock;
use crate::types::Result;

/// Bound on how long [`MockSubscriber::wait_for_count`] spins before giving
/// up, expressed against `FakeClock` rather than a real sleep.
const WAIT_FOR_COUNT_BUDGET: Duration = Duration::from_secs(5);

/// Assert two actions carry the same type, payload, source, and meta.
/// Timestamp, trace id, and action id are not compared — they are expected
/// to differ between any two independently constructed actions.
pub fn assert_actions_eq<T: PartialEq + Debug>(actual: &Action<T>, expected: &Action<T>) {
    pretty_assert_eq!(actual.action_type, expected.action_type);
    pretty_assert_eq!(&actual.payload, &expected.payload);
    pretty_assert_eq!(actual.source, expected.source);
    pretty_assert_eq!(actual.meta, expected.meta);
}

/// Records every payload/context pair it receives, for tests that want to
/// assert on the full delivery history rather than a single callback.
pub struct MockSubscriber<T> {
    received: Arc<Mutex<Vec<(T, Context)>>>,
}

impl<T> Default for MockSubscriber<T> {
    fn default() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: ActionPayload> MockSubscriber<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this mock to `action_type` on `bus`.
    pub fn subscribe_to(
        &self,
        bus: &Arc<Bus>,
        action_type: &ActionType<T>,
        opts: &[SubOption],
    ) -> Subscription {
        let received = self.received.clone();
        bus.subscribe(
            action_type,
            move |payload, ctx| -> Result<()> {
                received.lock().expect("poisoned").push((payload.clone(), ctx.clone()));
                Ok(())
            },
            opts,
        )
    }

    pub fn payloads(&self) -> Vec<T> {
        self.received
            .lock()
            .expect("poisoned")
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().expect("poisoned").len()
    }

    pub fn clear(&self) {
        self.received.lock().expect("poisoned").clear();
    }

    /// Spin until this subscriber has recorded at least `n` deliveries,
    /// giving up once `clock` has been advanced past an internal budget
    /// rather than a real wall-clock timeout. Returns whether `n` was
    /// reached.
    pub fn wait_for_count(&self, n: usize, clock: &FakeClock) -> bool {
        let budget = clock.timer(WAIT_FOR_COUNT_BUDGET);
        loop {
            if self.call_count() >= n {
                return true;
            }
            if budget.done() {
                return self.call_count() >= n;
            }
            std::thread::yield_now();
        }
    }
}
