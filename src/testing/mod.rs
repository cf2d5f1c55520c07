//! Testing fabric: an isolated bus, a fake clock, assertion helpers, and a
//! recording subscriber for host applications to build their own bus tests
//! on top of, mirroring what this crate's own test suite uses internally.

pub mod assert;
pub mod bus;
pub mod clock;
pub mod future;
pub mod test_future;

pub use assert::{assert_actions_eq, MockSubscriber};
pub use bus::{test_bus, test_bus_with_observability};
pub use clock::{FakeClock, TestTicker};
pub use future::{assert_rejects, assert_resolves, await_default, await_within};
pub use test_future::TestFuture;
