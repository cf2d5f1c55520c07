//! Single-handler registration, three concurrency policies, per-request
//! cancellation, timeout, and result delivery into a `Future`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::action::{Context, QueryType};
use crate::bus::Bus;
use crate::future::Future;
use crate::options::{AskOption, QueryOption};
use crate::types::{Error, RequestId, Result};

/// How a query handler deals with overlapping in-flight requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Reject a new request while one is already in flight.
    One,
    /// Cancel any in-flight request (rejecting it with `Timeout`) and
    /// accept the new one.
    Latest,
    /// Accept every request; they run one at a time, in arrival order,
    /// serialized behind the handler. This is genuine FIFO, not merely
    /// accepted-and-left-concurrent.
    Queue,
}

type QueryHandlerFn = dyn Fn(serde_json::Value, &Context) -> Result<serde_json::Value> + Send + Sync;

pub(crate) struct QueryHandlerEntry {
    pub priority: i32,
    pub policy: ConcurrencyPolicy,
    /// Default deadline for `Ask` callers that don't pass their own
    /// `AskOption::Timeout`, from `QueryOption::Timeout` at registration.
    pub default_timeout: Option<Duration>,
    pub handler: Arc<QueryHandlerFn>,
    /// Serializes `Queue`-policy requests; also used as the single mutex
    /// guarding `active` for `One`/`Latest` bookkeeping.
    pub serialize: Arc<tokio::sync::Mutex<()>>,
    pub active: StdMutex<HashMap<RequestId, oneshot::Sender<()>>>,
    pub active_count: AtomicUsize,
}

impl QueryHandlerEntry {
    fn cancel_all(&self) {
        let mut active = self.active.lock().expect("poisoned");
        for (_, cancel) in active.drain() {
            let _ = cancel.send(());
        }
    }
}

impl Bus {
    /// Register the single handler for a query type. A second registration
    /// replaces the first (its in-flight requests are cancelled).
    ///
    /// `QueryOption::Timeout` sets the default deadline `Ask` callers get
    /// when they don't pass their own `AskOption::Timeout`; `Ask` always
    /// wins when it does.
    pub fn handle_query<Req, Res>(
        self: &Arc<Self>,
        query_type: &QueryType<Req, Res>,
        handler: impl Fn(Req, &Context) -> Result<Res> + Send + Sync + 'static,
        opts: &[QueryOption],
    ) -> crate::bus::Subscription
    where
        Req: DeserializeOwned + Send + Sync + 'static,
        Res: Serialize + Send + Sync + 'static,
    {
        let (priority, policy, default_timeout) = parse_query_options(opts);

        let erased: Arc<QueryHandlerFn> = Arc::new(move |req_json, ctx| {
            let req: Req = serde_json::from_value(req_json)?;
            let res = handler(req, ctx)?;
            Ok(serde_json::to_value(res)?)
        });

        let entry = Arc::new(QueryHandlerEntry {
            priority,
            policy,
            default_timeout,
            handler: erased,
            serialize: Arc::new(tokio::sync::Mutex::new(())),
            active: StdMutex::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        });

        let name = query_type.name().to_string();
        if let Some(prev) = self
            .query_handlers
            .write()
            .expect("poisoned")
            .insert(name.clone(), entry)
        {
            tracing::warn!(query_type = %name, "replacing existing query handler");
            prev.cancel_all();
        }

        crate::bus::Subscription::for_query(Arc::downgrade(self), name)
    }

    /// Issue a request against a query type's registered handler.
    pub fn ask<Req, Res>(
        self: &Arc<Self>,
        query_type: &QueryType<Req, Res>,
        request: Req,
        opts: &[AskOption],
    ) -> Future<Res>
    where
        Req: Serialize + Send + Sync + 'static,
        Res: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let future = Future::new();
        let name = query_type.name().to_string();

        let entry = match self.query_handlers.read().expect("poisoned").get(&name).cloned() {
            Some(entry) => entry,
            None => {
                future.reject(Error::no_handler(name));
                return future;
            }
        };

        let mut timeout = entry.default_timeout.or(self.config.defaults.query_timeout);
        let mut ctx = Context::new(self.scope_path().to_string());
        for opt in opts {
            match opt {
                AskOption::Timeout(d) => timeout = Some(*d),
                AskOption::Context(c) => ctx = c.clone(),
                AskOption::Priority(_) => {}
                AskOption::TraceId(id) => ctx.trace_id = id.clone(),
                AskOption::Meta(m) => ctx.meta.extend(m.clone()),
                AskOption::Source(s) => ctx.source = s.clone(),
            }
        }

        let req_json = match serde_json::to_value(&request) {
            Ok(v) => v,
            Err(e) => {
                future.reject(Error::from(e));
                return future;
            }
        };

        let request_id = RequestId::new();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        match entry.policy {
            ConcurrencyPolicy::One => {
                let mut active = entry.active.lock().expect("poisoned");
                if !active.is_empty() {
                    future.reject(Error::rejected_by_policy(name));
                    return future;
                }
                active.insert(request_id.clone(), cancel_tx);
            }
            ConcurrencyPolicy::Latest => {
                let mut active = entry.active.lock().expect("poisoned");
                for (_, cancel) in active.drain() {
                    let _ = cancel.send(());
                }
                active.insert(request_id.clone(), cancel_tx);
            }
            ConcurrencyPolicy::Queue => {
                entry.active.lock().expect("poisoned").insert(request_id.clone(), cancel_tx);
            }
        }
        entry.active_count.fetch_add(1, Ordering::AcqRel);

        let fut_for_task = future.clone();
        let entry_for_task = entry.clone();
        let request_id_for_task = request_id.clone();
        let name_for_task = name.clone();

        tokio::spawn(async move {
            let (result_tx, result_rx) = oneshot::channel();
            let policy = entry_for_task.policy;
            let handler = entry_for_task.handler.clone();
            let serialize = entry_for_task.serialize.clone();

            tokio::spawn(async move {
                let _permit = if policy == ConcurrencyPolicy::Queue {
                    Some(serialize.lock_owned().await)
                } else {
                    None
                };
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(req_json, &ctx)
                }));
                let result = match outcome {
                    Ok(r) => r,
                    Err(payload) => Err(Error::panic(crate::bus::panic_message(&payload))),
                };
                let _ = result_tx.send(result);
            });

            let outcome = if let Some(d) = timeout {
                tokio::select! {
                    r = result_rx => r.unwrap_or_else(|_| Err(Error::internal("handler task dropped"))),
                    _ = cancel_rx => Err(Error::timeout(name_for_task.clone(), d)),
                    _ = tokio::time::sleep(d) => Err(Error::timeout(name_for_task.clone(), d)),
                }
            } else {
                tokio::select! {
                    r = result_rx => r.unwrap_or_else(|_| Err(Error::internal("handler task dropped"))),
                    _ = cancel_rx => Err(Error::timeout(name_for_task.clone(), Duration::from_secs(0))),
                }
            };

            entry_for_task.active.lock().expect("poisoned").remove(&request_id_for_task);
            entry_for_task.active_count.fetch_sub(1, Ordering::AcqRel);

            match outcome {
                Ok(res_json) => match serde_json::from_value::<Res>(res_json) {
                    Ok(res) => fut_for_task.resolve(res),
                    Err(e) => fut_for_task.reject(Error::from(e)),
                },
                Err(e) => fut_for_task.reject(e),
            }
        });

        future
    }
}

pub(crate) fn cancel_query_handler(entry: &Arc<QueryHandlerEntry>) {
    entry.cancel_all();
}

fn parse_query_options(opts: &[QueryOption]) -> (i32, ConcurrencyPolicy, Option<Duration>) {
    let mut priority = 0;
    let mut policy = ConcurrencyPolicy::One;
    let mut timeout = None;
    for opt in opts {
        match opt {
            QueryOption::Priority(p) => priority = *p,
            QueryOption::ConcurrencyPolicy(p) => policy = *p,
            QueryOption::Timeout(d) => timeout = Some(*d),
        }
    }
    (priority, policy, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{query_with_concurrency_policy, query_with_priority, query_with_timeout};
    use crate::types::BusConfig;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn handle_query_accepts_a_query_option_slice() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let bus = Bus::new(BusConfig::default());
            let echo: QueryType<i32, i32> = QueryType::new("echo");
            let calls = Arc::new(StdAtomicUsize::new(0));
            let c = calls.clone();
            bus.handle_query(
                &echo,
                move |req, _ctx| {
                    c.fetch_add(1, Ordering::AcqRel);
                    Ok(req)
                },
                &[query_with_priority(5), query_with_concurrency_policy(ConcurrencyPolicy::One)],
            );

            let result = bus.ask(&echo, 7, &[]).await_blocking().unwrap();
            assert_eq!(result, 7);
            assert_eq!(calls.load(Ordering::Acquire), 1);
        });
    }

    #[test]
    fn query_with_timeout_option_sets_the_default_ask_deadline() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let bus = Bus::new(BusConfig::default());
            let slow: QueryType<(), ()> = QueryType::new("slow-default-timeout");
            bus.handle_query(
                &slow,
                |_req, _ctx| {
                    std::thread::sleep(Duration::from_millis(100));
                    Ok(())
                },
                &[query_with_timeout(Duration::from_millis(10))],
            );

            let result = bus.ask(&slow, (), &[]).await_blocking();
            assert!(matches!(result, Err(Error::Timeout(_, _))));
        });
    }
}
