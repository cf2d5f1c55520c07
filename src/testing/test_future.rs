//! [`TestFuture`] is the fake-clock-aware counterpart to
//! [`crate::future::Future`]: same single-assignment promise, but its
//! `await_within` races against a [`FakeClock`] deadline instead of a real
//! OS timer, so a test can assert on a timeout without actually waiting for
//! it.

use std::time::Duration;

use crate::future::Future;
use crate::testing::clock::FakeClock;
use crate::types::{Error, Result};

/// Thin wrapper around [`Future`] whose only new behavior is
/// [`TestFuture::await_within`] — every other method forwards directly.
pub struct TestFuture<T: Clone + Send + 'static> {
    inner: Future<T>,
}

impl<T: Clone + Send + 'static> Clone for TestFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for TestFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> TestFuture<T> {
    pub fn new() -> Self {
        Self { inner: Future::new() }
    }

    pub fn resolved(value: T) -> Self {
        Self {
            inner: Future::resolved(value),
        }
    }

    pub fn rejected(err: Error) -> Self {
        Self {
            inner: Future::rejected(err),
        }
    }

    pub fn resolve(&self, value: T) {
        self.inner.resolve(value);
    }

    pub fn reject(&self, err: Error) {
        self.inner.reject(err);
    }

    pub fn done(&self) -> bool {
        self.inner.done()
    }

    pub fn then(&self, f: impl FnOnce(T) + Send + 'static) {
        self.inner.then(f);
    }

    pub fn catch(&self, f: impl FnOnce(Error) + Send + 'static) {
        self.inner.catch(f);
    }

    /// Wait for this future to settle against `clock`'s own advancement
    /// rather than wall-clock time: rejects with `Error::Timeout` once
    /// `clock` has been advanced `timeout` past the moment this is called,
    /// without the future itself ever having resolved.
    pub fn await_within(&self, clock: &FakeClock, timeout: Duration) -> Result<T> {
        let deadline = clock.timer(timeout);
        loop {
            if self.inner.done() {
                return self.inner.await_blocking();
            }
            if deadline.done() {
                return Err(Error::timeout("test-future", timeout));
            }
            std::thread::yield_now();
        }
    }
}
