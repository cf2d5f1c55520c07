//! A manually-advanced clock for deterministic timing tests, plus a simple
//! ticker built on it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::testing::test_future::TestFuture;

struct Waker {
    deadline: DateTime<Utc>,
    fire: Box<dyn FnOnce() + Send>,
}

struct TickerReg {
    interval: Duration,
    next: DateTime<Utc>,
    ticker: TestTicker,
}

struct ClockState {
    now: DateTime<Utc>,
    wakers: Vec<Waker>,
    tickers: Vec<TickerReg>,
}

/// A clock whose `now()` only moves when `advance`/`set` is called — lets
/// tests exercise timeout and ring-buffer-ordering logic without real sleeps.
///
/// `timer`/`ticker` register callbacks against the clock's own advancement
/// instead of a real OS timer, so [`TestFuture::await_within`] and
/// `MockSubscriber::wait_for_count` can race against a deadline that only
/// moves when the test advances it.
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<Mutex<ClockState>>,
}

impl std::fmt::Debug for FakeClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeClock").field("now", &self.now()).finish()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        // A fixed epoch rather than `Utc::now()` keeps tests reproducible.
        Self::at(DateTime::from_timestamp(0, 0).expect("valid epoch"))
    }
}

impl FakeClock {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                now: time,
                wakers: Vec::new(),
                tickers: Vec::new(),
            })),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().expect("poisoned").now
    }

    pub fn advance(&self, duration: Duration) {
        let target =
            self.now() + chrono::Duration::from_std(duration).expect("duration fits in chrono::Duration");
        self.set(target);
    }

    pub fn set(&self, time: DateTime<Utc>) {
        let fired = {
            let mut state = self.state.lock().expect("poisoned");
            state.now = time;

            let mut fired = Vec::new();
            let mut remaining = Vec::new();
            for waker in state.wakers.drain(..) {
                if waker.deadline <= time {
                    fired.push(waker.fire);
                } else {
                    remaining.push(waker);
                }
            }
            state.wakers = remaining;

            for reg in &mut state.tickers {
                while reg.next <= time {
                    reg.ticker.tick();
                    reg.next +=
                        chrono::Duration::from_std(reg.interval).expect("interval fits in chrono::Duration");
                }
            }
            fired
        };
        for fire in fired {
            fire();
        }
    }

    /// A future that resolves once the clock has been advanced `duration`
    /// past the moment this is called, rather than after a real OS sleep.
    pub fn timer(&self, duration: Duration) -> TestFuture<()> {
        let future = TestFuture::new();
        let now = self.now();
        let deadline = now + chrono::Duration::from_std(duration).expect("duration fits in chrono::Duration");
        if deadline <= now {
            future.resolve(());
            return future;
        }
        let resolver = future.clone();
        self.state.lock().expect("poisoned").wakers.push(Waker {
            deadline,
            fire: Box::new(move || resolver.resolve(())),
        });
        future
    }

    /// A ticker that fires once every `interval` of clock time, rather than
    /// real wall-clock time.
    pub fn ticker(&self, interval: Duration) -> TestTicker {
        let ticker = TestTicker::new();
        let next =
            self.now() + chrono::Duration::from_std(interval).expect("interval fits in chrono::Duration");
        self.state.lock().expect("poisoned").tickers.push(TickerReg {
            interval,
            next,
            ticker: ticker.clone(),
        });
        ticker
    }
}

/// A counter driven by repeated `tick()` calls, standing in for a periodic
/// timer in tests that assert on N occurrences rather than wall-clock time.
#[derive(Debug, Default, Clone)]
pub struct TestTicker {
    count: Arc<Mutex<u64>>,
}

impl TestTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        let mut count = self.count.lock().expect("poisoned");
        *count += 1;
        *count
    }

    pub fn count(&self) -> u64 {
        *self.count.lock().expect("poisoned")
    }
}
