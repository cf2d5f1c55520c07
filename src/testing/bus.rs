//! An isolated bus for tests, so a test never accidentally observes or
//! pollutes [`crate::process_bus`]. Explicit injection rather than a shared
//! ambient global in test code.

use std::sync::Arc;

use crate::bus::Bus;
use crate::types::BusConfig;

/// A freshly constructed root bus, independent from every other `test_bus()`
/// call and from the process singleton.
pub fn test_bus() -> Arc<Bus> {
    Bus::new(BusConfig::default())
}

/// A test bus with the dev logger and a ring buffer pre-enabled, for tests
/// that assert on observability output.
pub fn test_bus_with_observability(ring_buffer_size: usize) -> Arc<Bus> {
    let mut config = BusConfig::default();
    config.observability.dev_log_default_on = true;
    config.observability.ring_buffer_default_size = ring_buffer_size;
    Bus::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_call_is_independent() {
        let a = test_bus();
        let b = test_bus();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
