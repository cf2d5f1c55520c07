//! Assertion-friendly helpers around [`crate::future::Future`] for tests
//! that don't want to hand-roll a timeout on every `ask`.

use std::time::Duration;

use crate::future::Future;
use crate::types::{Error, Result};

/// The default bound used by [`await_within`] when a test doesn't care
/// about the exact timeout, only that it doesn't hang the suite.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Block up to `timeout` for a future to settle; returns `Error::Timeout`
/// rather than hanging if it never does. Thin wrapper over
/// `Future::await_timeout`, named for readability at test call sites.
pub fn await_within<T: Clone + Send + 'static>(fut: &Future<T>, timeout: Duration) -> Result<T> {
    fut.await_timeout(timeout)
}

/// `await_within` with [`DEFAULT_TEST_TIMEOUT`].
pub fn await_default<T: Clone + Send + 'static>(fut: &Future<T>) -> Result<T> {
    await_within(fut, DEFAULT_TEST_TIMEOUT)
}

/// Assert the future resolves within `timeout`, returning the value or
/// panicking with a descriptive message.
pub fn assert_resolves<T: Clone + Send + 'static>(fut: &Future<T>, timeout: Duration) -> T {
    match await_within(fut, timeout) {
        Ok(v) => v,
        Err(Error::Timeout(..)) => panic!("future did not resolve within {timeout:?}"),
        Err(e) => panic!("future rejected instead of resolving: {e}"),
    }
}

/// Assert the future rejects within `timeout`, returning the error or
/// panicking with a descriptive message.
pub fn assert_rejects<T: Clone + Send + 'static>(fut: &Future<T>, timeout: Duration) -> Error {
    match await_within(fut, timeout) {
        Ok(_) => panic!("future resolved instead of rejecting"),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_resolves_returns_the_value() {
        let fut = Future::resolved(42);
        assert_eq!(assert_resolves(&fut, Duration::from_millis(50)), 42);
    }

    #[test]
    fn assert_rejects_returns_the_error() {
        let fut: Future<i32> = Future::rejected(Error::internal("boom"));
        assert!(matches!(assert_rejects(&fut, Duration::from_millis(50)), Error::Internal(_)));
    }
}
