//! End-to-end scenarios exercising dispatch, queries, bridges, lifecycle,
//! and scoping together rather than unit-by-unit.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use action_bus::bridge::signal::Signal;
use action_bus::options::{
    ask_with_timeout, bridge_with_drop_policy, bridge_with_initial_value, query_with_concurrency_policy,
    query_with_priority, sub_once, sub_with_priority, with_async, with_trace,
};
use action_bus::query::ConcurrencyPolicy;
use action_bus::stream::DropPolicy;
use action_bus::testing::{assert_resolves, test_bus};
use action_bus::types::{BusConfig, TraceId};
use action_bus::{Action, ActionType, QueryType};

#[test]
fn dispatch_delivers_in_priority_then_fifo_order() {
    let bus = test_bus();
    let counted: ActionType<i32> = ActionType::new("counted");
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let o1 = order.clone();
    bus.subscribe(&counted, move |_v, _c| {
        o1.lock().unwrap().push("first-registered-equal-priority");
        Ok(())
    }, &[sub_with_priority(5)]);

    let o2 = order.clone();
    bus.subscribe(&counted, move |_v, _c| {
        o2.lock().unwrap().push("second-registered-equal-priority");
        Ok(())
    }, &[sub_with_priority(5)]);

    let o3 = order.clone();
    bus.subscribe(&counted, move |_v, _c| {
        o3.lock().unwrap().push("high-priority");
        Ok(())
    }, &[sub_with_priority(50)]);

    bus.dispatch(&counted, 1, &[]).unwrap();
    assert_eq!(
        *order.lock().unwrap(),
        vec!["high-priority", "first-registered-equal-priority", "second-registered-equal-priority"]
    );
}

#[test]
fn async_dispatch_runs_off_the_calling_thread() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let action_type: ActionType<i32> = ActionType::new("async-counted");
        let done = Arc::new(tokio::sync::Notify::new());
        let done2 = done.clone();

        bus.subscribe(&action_type, move |_v, _c| {
            done2.notify_one();
            Ok(())
        }, &[]);

        bus.dispatch(&action_type, 1, &[with_async()]).unwrap();
        tokio::time::timeout(Duration::from_millis(200), done.notified())
            .await
            .expect("async dispatch should have delivered");
    });
}

#[test]
fn query_one_policy_rejects_overlapping_requests() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let slow: QueryType<i32, i32> = QueryType::new("slow-add-one");
        bus.handle_query(&slow, |req, _ctx| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(req + 1)
        }, &[query_with_priority(0), query_with_concurrency_policy(ConcurrencyPolicy::One)]);

        let first = bus.ask(&slow, 1, &[]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = bus.ask(&slow, 2, &[]);

        let second_result = second.await_blocking();
        assert!(second_result.is_err(), "second request should be rejected while the first is in flight");
        assert_eq!(first.await_blocking().unwrap(), 2);
    });
}

#[test]
fn query_times_out_when_handler_is_slower_than_the_deadline() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let slow: QueryType<(), ()> = QueryType::new("never-replies");
        bus.handle_query(&slow, |_req, _ctx| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }, &[query_with_concurrency_policy(ConcurrencyPolicy::Queue)]);

        let fut = bus.ask(&slow, (), &[ask_with_timeout(Duration::from_millis(30))]);
        let result = fut.await_blocking();
        assert!(result.is_err());
    });
}

#[test]
fn query_queue_policy_serializes_requests_fifo() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let echo: QueryType<i32, i32> = QueryType::new("queued-echo");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        bus.handle_query(&echo, move |req, _ctx| {
            seen2.lock().unwrap().push(req);
            std::thread::sleep(Duration::from_millis(20));
            Ok(req)
        }, &[query_with_concurrency_policy(ConcurrencyPolicy::Queue)]);

        let a = bus.ask(&echo, 1, &[]);
        let b = bus.ask(&echo, 2, &[]);
        let c = bus.ask(&echo, 3, &[]);

        assert_eq!(a.await_blocking().unwrap(), 1);
        assert_eq!(b.await_blocking().unwrap(), 2);
        assert_eq!(c.await_blocking().unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    });
}

#[test]
fn query_without_a_handler_rejects_with_no_handler() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let unregistered: QueryType<i32, i32> = QueryType::new("unregistered");
        let fut = bus.ask(&unregistered, 1, &[]);
        assert!(fut.await_blocking().is_err());
    });
}

#[test]
fn once_subscription_is_delivered_a_single_time_across_many_dispatches() {
    let bus = test_bus();
    let action_type: ActionType<i32> = ActionType::new("incr");
    let count = Arc::new(AtomicI32::new(0));
    let c = count.clone();
    bus.subscribe(&action_type, move |_v, _c| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }, &[sub_once()]);

    for _ in 0..5 {
        bus.dispatch(&action_type, 1, &[]).unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn explicit_trace_id_and_source_win_over_context_defaults() {
    let bus = test_bus();
    let action_type: ActionType<i32> = ActionType::new("traced");
    let seen = Arc::new(Mutex::new(None));
    let seen2 = seen.clone();
    bus.subscribe_any(move |action, ctx| {
        *seen2.lock().unwrap() = Some((action.trace_id.clone(), ctx.trace_id.clone()));
        Ok(())
    }, &[]);

    let explicit = TraceId::new();
    bus.dispatch(&action_type, 1, &[with_trace(explicit.clone())]).unwrap();

    let (action_trace, ctx_trace) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(action_trace, Some(explicit.clone()));
    assert_eq!(ctx_trace, explicit);
}

#[test]
fn child_bus_is_independently_scoped_but_inherits_the_error_hook() {
    let bus = test_bus();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = errors.clone();
    bus.on_error(Arc::new(move |_ctx, err| {
        e.lock().unwrap().push(err.to_string());
    }));

    let child = bus.child("workers");
    assert_eq!(child.scope_path(), "root/workers");

    let action_type: ActionType<i32> = ActionType::new("boom");
    child.subscribe(&action_type, |_v, _c| panic!("child handler panics"), &[]);
    let _ = child.dispatch(&action_type, 1, &[]);

    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[test]
fn to_signal_tracks_the_latest_dispatched_value() {
    let bus = test_bus();
    let action_type: ActionType<i32> = ActionType::new("gauge");
    let bridge = bus
        .to_signal(&action_type, &[bridge_with_initial_value(0)])
        .unwrap();

    assert_eq!(bridge.get(), 0);
    bus.dispatch(&action_type, 42, &[]).unwrap();
    assert_eq!(bridge.get(), 42);
}

#[test]
fn to_stream_buffers_dispatched_values_with_a_drop_policy() {
    let bus = test_bus();
    let action_type: ActionType<i32> = ActionType::new("events");
    let bridge = bus.to_stream(&action_type, &[bridge_with_drop_policy(DropPolicy::DropOldest)]);

    for v in 0..3 {
        bus.dispatch(&action_type, v, &[]).unwrap();
    }

    let mut received = Vec::new();
    while let Some(v) = bridge.try_recv() {
        received.push(v);
    }
    assert_eq!(received, vec![0, 1, 2]);
}

#[test]
fn bare_value_dispatch_is_wrapped_as_unknown() {
    let bus = test_bus();
    let recorded = Arc::new(Mutex::new(None));
    let recorded2 = recorded.clone();
    bus.subscribe_any(move |action, _ctx| {
        *recorded2.lock().unwrap() = Some(action.action_type.clone());
        Ok(())
    }, &[]);

    bus.dispatch_value(serde_json::json!({"hello": "world"}), &[]).unwrap();
    assert_eq!(recorded.lock().unwrap().as_deref(), Some("unknown"));
}

#[test]
fn debug_ring_buffer_retains_the_most_recent_entries_per_type() {
    let bus = test_bus();
    bus.enable_debug_ring_buffer(2);
    let action_type: ActionType<i32> = ActionType::new("ring");

    for v in 0..5 {
        bus.dispatch(&action_type, v, &[]).unwrap();
    }

    let entries = bus.debug_ring_buffer_entries("ring");
    assert_eq!(entries.len(), 2);
}

#[test]
fn query_latest_policy_cancels_the_superseded_request() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let latest: QueryType<i32, i32> = QueryType::new("latest-wins");
        bus.handle_query(&latest, |req, _ctx| {
            std::thread::sleep(Duration::from_millis(80));
            Ok(req)
        }, &[query_with_concurrency_policy(ConcurrencyPolicy::Latest)]);

        let superseded = bus.ask(&latest, 1, &[]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let winner = bus.ask(&latest, 2, &[]);

        assert!(superseded.await_blocking().is_err());
        assert_eq!(assert_resolves(&winner, Duration::from_secs(1)), 2);
    });
}

#[test]
fn handle_query_honors_priority_and_concurrency_policy_options() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let bus = test_bus();
        let guarded: QueryType<i32, i32> = QueryType::new("guarded-add-one");
        bus.handle_query(&guarded, |req, _ctx| {
            std::thread::sleep(Duration::from_millis(60));
            Ok(req + 1)
        }, &[query_with_priority(7), query_with_concurrency_policy(ConcurrencyPolicy::One)]);

        let first = bus.ask(&guarded, 1, &[]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = bus.ask(&guarded, 2, &[]);

        assert!(second.await_blocking().is_err(), "One policy should reject the overlapping request");
        assert_eq!(first.await_blocking().unwrap(), 2);
    });
}

#[test]
fn signal_get_returns_its_constructed_initial_value() {
    let signal = Signal::new(10);
    assert_eq!(signal.get(), 10);
}

#[test]
fn default_bus_config_has_no_query_timeout_and_small_bridge_buffer() {
    let config = BusConfig::default();
    assert!(config.defaults.query_timeout.is_none());
    assert_eq!(config.defaults.bridge_buffer_size, 10);
}

#[test]
fn action_new_builds_unique_action_ids() {
    let a: Action<i32> = Action::new("x", 1);
    let b: Action<i32> = Action::new("x", 1);
    assert_ne!(a.action_id, b.action_id);
}
