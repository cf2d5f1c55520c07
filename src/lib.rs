//! # Action Bus
//!
//! An in-process, typed, scoped publish/subscribe and request/response
//! message bus, providing:
//! - Zero-copy typed dispatch alongside a type-erased any-handler view
//! - A single-handler query engine with `One`/`Latest`/`Queue` concurrency
//!   policies, timeouts, and cancellation
//! - Bridges from actions into signal (`ToSignal`) and stream (`ToStream`)
//!   abstractions
//! - Lifecycle helpers that tie subscriptions to a cleanup scope
//! - Dev-log, per-type debug ring buffers, analytics taps, and an enhanced
//!   error hook
//! - A testing fabric: fake clock, isolated test bus, mock subscribers
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────────┐
//!   dispatch/ask  →  │               Bus                │
//!                    │  ┌─────────┐  ┌───────────────┐  │
//!                    │  │Registry │  │ Query Engine   │  │
//!                    │  └─────────┘  └───────────────┘  │
//!                    │  ┌─────────┐  ┌───────────────┐  │
//!                    │  │ Bridges │  │ Observability  │  │
//!                    │  └─────────┘  └───────────────┘  │
//!                    └─────────────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod action;
pub mod bridge;
pub mod bus;
pub mod future;
pub mod lifecycle;
pub mod options;
pub mod query;
pub mod stream;
pub mod testing;
pub mod types;

pub(crate) mod dispatch;
mod observability;
mod registry;

pub use action::{Action, ActionPayload, ActionType, AnyAction, Context, Payload, QueryType};
pub use bus::{Bus, Subscription};
pub use future::Future;
pub use observability::{
    ActionRecord, AnalyticsEvent, DevLogEntry, DevLogHandler, EnhancedErrorHook, ErrorHook,
    ObservabilityStats,
};
pub use query::ConcurrencyPolicy;
pub use stream::{DropPolicy, Stream};
pub use types::{BusConfig, Error, Result};

use std::sync::{Arc, OnceLock};

/// The process-wide singleton bus, built from the default config on first
/// access. An explicit, lazily-initialized accessor rather than an implicit
/// ambient global — tests should use [`testing::test_bus`] instead of this.
pub fn process_bus() -> Arc<Bus> {
    static PROCESS_BUS: OnceLock<Arc<Bus>> = OnceLock::new();
    PROCESS_BUS
        .get_or_init(|| Bus::new(BusConfig::default()))
        .clone()
}
