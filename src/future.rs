//! Single-assignment promise used as the return value of queries.
//!
//! Unlike `std::future::Future`, this is a concrete, synchronously pollable
//! promise with a blocking `await_blocking`/`await_timeout` and
//! callback-style `then`/`catch`, not a Rust async/await future. `Bus::ask`
//! spawns an async task that eventually calls `resolve`/`reject` on one of
//! these from the other side.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::types::Error;

type Result<T> = std::result::Result<T, Error>;

enum State<T> {
    Pending {
        thens: Vec<Box<dyn FnOnce(T) + Send>>,
        catches: Vec<Box<dyn FnOnce(Error) + Send>>,
    },
    Resolved(T),
    Rejected(Error),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

/// A single-assignment future: `resolve`/`reject` is a no-op once the
/// future is already done; `then`/`catch` callbacks registered after
/// completion fire immediately.
pub struct Future<T: Clone + Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    thens: Vec::new(),
                    catches: Vec::new(),
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Build an already-resolved future (useful for synchronous handlers).
    pub fn resolved(value: T) -> Self {
        let fut = Self::new();
        fut.resolve(value);
        fut
    }

    /// Build an already-rejected future.
    pub fn rejected(err: Error) -> Self {
        let fut = Self::new();
        fut.reject(err);
        fut
    }

    pub fn resolve(&self, value: T) {
        let thens = {
            let mut state = self.inner.state.lock().expect("future mutex poisoned");
            match std::mem::replace(&mut *state, State::Resolved(value.clone())) {
                State::Pending { thens, .. } => thens,
                other => {
                    // Already done: restore and no-op.
                    *state = other;
                    return;
                }
            }
        };
        self.inner.condvar.notify_all();
        for cb in thens {
            cb(value.clone());
        }
    }

    pub fn reject(&self, err: Error) {
        let catches = {
            let mut state = self.inner.state.lock().expect("future mutex poisoned");
            match std::mem::replace(&mut *state, State::Rejected(err.clone())) {
                State::Pending { catches, .. } => catches,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        self.inner.condvar.notify_all();
        for cb in catches {
            cb(err.clone());
        }
    }

    pub fn done(&self) -> bool {
        !matches!(
            &*self.inner.state.lock().expect("future mutex poisoned"),
            State::Pending { .. }
        )
    }

    /// Register a success callback. Fires immediately if already resolved;
    /// never fires if already rejected.
    pub fn then(&self, f: impl FnOnce(T) + Send + 'static) {
        let mut state = self.inner.state.lock().expect("future mutex poisoned");
        match &mut *state {
            State::Pending { thens, .. } => thens.push(Box::new(f)),
            State::Resolved(v) => {
                let v = v.clone();
                drop(state);
                f(v);
            }
            State::Rejected(_) => {}
        }
    }

    /// Register a failure callback. Fires immediately if already rejected;
    /// never fires if already resolved.
    pub fn catch(&self, f: impl FnOnce(Error) + Send + 'static) {
        let mut state = self.inner.state.lock().expect("future mutex poisoned");
        match &mut *state {
            State::Pending { catches, .. } => catches.push(Box::new(f)),
            State::Rejected(e) => {
                let e = e.clone();
                drop(state);
                f(e);
            }
            State::Resolved(_) => {}
        }
    }

    /// A distinct future resolved/rejected with the same value as `self`
    /// (no transformation).
    pub fn chain(&self) -> Future<T> {
        let next = Future::new();
        let resolve_next = next.clone();
        let reject_next = next.clone();
        self.then(move |v| resolve_next.resolve(v));
        self.catch(move |e| reject_next.reject(e));
        next
    }

    /// Block the current thread until the future is done.
    pub fn await_blocking(&self) -> Result<T> {
        let guard = self.inner.state.lock().expect("future mutex poisoned");
        let guard = self
            .inner
            .condvar
            .wait_while(guard, |s| matches!(s, State::Pending { .. }))
            .expect("future mutex poisoned");
        match &*guard {
            State::Resolved(v) => Ok(v.clone()),
            State::Rejected(e) => Err(e.clone()),
            State::Pending { .. } => unreachable!("wait_while only exits on non-pending state"),
        }
    }

    /// Block up to `timeout`, returning `Error::Timeout` if still pending.
    pub fn await_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.state.lock().expect("future mutex poisoned");
        loop {
            match &*guard {
                State::Resolved(v) => return Ok(v.clone()),
                State::Rejected(e) => return Err(e.clone()),
                State::Pending { .. } => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::timeout("future", timeout));
            }
            let (g, timeout_result) = self
                .inner
                .condvar
                .wait_timeout(guard, deadline - now)
                .expect("future mutex poisoned");
            guard = g;
            if timeout_result.timed_out() {
                match &*guard {
                    State::Resolved(v) => return Ok(v.clone()),
                    State::Rejected(e) => return Err(e.clone()),
                    State::Pending { .. } => return Err(Error::timeout("future", timeout)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_single_assignment() {
        let fut = Future::new();
        fut.resolve(1);
        fut.resolve(2);
        assert_eq!(fut.await_blocking().unwrap(), 1);
    }

    #[test]
    fn then_fires_immediately_when_already_resolved() {
        let fut = Future::resolved(42);
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        fut.then(move |v| *seen2.lock().unwrap() = Some(v));
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[test]
    fn catch_fires_immediately_when_already_rejected() {
        let fut: Future<i32> = Future::rejected(Error::internal("boom"));
        let seen = Arc::new(Mutex::new(false));
        let seen2 = seen.clone();
        fut.catch(move |_| *seen2.lock().unwrap() = true);
        assert!(*seen.lock().unwrap());
    }

    #[test]
    fn chain_propagates_resolution() {
        let fut = Future::new();
        let next = fut.chain();
        fut.resolve(7);
        assert_eq!(next.await_blocking().unwrap(), 7);
    }

    #[test]
    fn await_timeout_times_out_on_pending() {
        let fut: Future<i32> = Future::new();
        let result = fut.await_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(Error::Timeout(_, _))));
    }

    #[test]
    fn await_blocking_wakes_on_resolve_from_another_thread() {
        let fut = Future::new();
        let producer = fut.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.resolve(99);
        });
        assert_eq!(fut.await_blocking().unwrap(), 99);
    }
}
