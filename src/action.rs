//! Identifiers and values: action/query type handles, the `Action` record,
//! dispatch `Context`, and the dynamic `Payload` used for any-handlers,
//! bridges, and the filter/dedup pipeline.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{ActionId, Error, Result, TraceId};

/// Bound satisfied by any type usable as an action/query payload.
///
/// Payloads must be serializable because the any-handler path, bridges, and
/// the filter/dedup pipeline all operate on a type-erased JSON view (see
/// `Payload`) rather than on `T` directly, per the "sum of variants"
/// resolution of the dynamic-payload design note.
pub trait ActionPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static> ActionPayload for T {}

/// A stable name plus a phantom payload type, identifying an action kind.
///
/// Identity is by name; uniqueness across the process is the caller's
/// responsibility (two `ActionType<T>` values with the same name but
/// different `T` are a caller bug, not something this type prevents).
pub struct ActionType<T> {
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ActionType<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for ActionType<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ActionType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionType").field("name", &self.name).finish()
    }
}

/// A stable name plus phantom request/response types, identifying a query.
pub struct QueryType<Req, Res> {
    name: Arc<str>,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res> QueryType<Req, Res> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<Req, Res> Clone for QueryType<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Res> fmt::Debug for QueryType<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryType").field("name", &self.name).finish()
    }
}

/// A typed, named message dispatched on a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action<T> {
    pub action_type: String,
    pub payload: T,
    #[serde(default)]
    pub meta: Option<HashMap<String, serde_json::Value>>,
    pub time: DateTime<Utc>,
    /// Empty string means "not yet set" — `Bus::dispatch` fills it from
    /// `DispatchOption::WithSource` when still empty. An explicitly set
    /// source or trace id always wins over the context defaults.
    pub source: String,
    /// `None` means "not yet set" — `Bus::dispatch` fills it from
    /// `DispatchOption::WithTrace`, or generates a fresh one, only when
    /// still `None`.
    pub trace_id: Option<TraceId>,
    pub action_id: ActionId,
}

impl<T> Action<T> {
    /// Build an action with the given type and payload; every other field
    /// gets a fresh default (current time, random action id, no trace id,
    /// empty source/meta). `Bus::dispatch` fills in context-derived fields
    /// that are still at their default.
    pub fn new(action_type: impl Into<String>, payload: T) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
            meta: None,
            time: Utc::now(),
            source: String::new(),
            trace_id: None,
            action_id: ActionId::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_trace(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn with_meta(mut self, meta: HashMap<String, serde_json::Value>) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Action type used for bare, non-`Action`-wrapped dispatches (spec: "bare
/// values ... are auto-wrapped with type `unknown`").
pub const UNKNOWN_ACTION_TYPE: &str = "unknown";

/// Per-dispatch context, propagated to every observer and error hook for one
/// dispatch call.
#[derive(Debug, Clone)]
pub struct Context {
    pub scope: String,
    pub meta: HashMap<String, serde_json::Value>,
    pub time: DateTime<Utc>,
    pub trace_id: TraceId,
    pub source: String,
}

impl Context {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            meta: HashMap::new(),
            time: Utc::now(),
            trace_id: TraceId::new(),
            source: String::new(),
        }
    }
}

/// A type-erased JSON view of a payload, used for any-handlers, the
/// filter/gate/dedup pipeline, bridges, and observability records.
///
/// `PartialEq` is structural deep equality over the underlying JSON value —
/// this is exactly the "structural deep equality" the dedup pipeline falls
/// back to when no custom equality is supplied (`serde_json::Value`
/// implements `PartialEq` recursively).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload(pub serde_json::Value);

impl Payload {
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone()).map_err(Error::from)
    }
}

/// The any-handler view of an action: type name carried alongside a
/// type-erased payload.
pub type AnyAction = Action<Payload>;

impl<T: Serialize> Action<T> {
    /// Project this action into the type-erased `AnyAction` form delivered
    /// to any-handlers, bridges, and observability taps.
    pub fn to_any(&self) -> Result<AnyAction> {
        Ok(Action {
            action_type: self.action_type.clone(),
            payload: Payload::from_serializable(&self.payload)?,
            meta: self.meta.clone(),
            time: self.time,
            source: self.source.clone(),
            trace_id: self.trace_id.clone(),
            action_id: self.action_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_identity_is_by_name() {
        let a: ActionType<String> = ActionType::new("greet");
        let b: ActionType<String> = ActionType::new("greet");
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn payload_structural_equality() {
        let a = Payload::from_serializable(&serde_json::json!({"x": 1})).unwrap();
        let b = Payload::from_serializable(&serde_json::json!({"x": 1})).unwrap();
        let c = Payload::from_serializable(&serde_json::json!({"x": 2})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn to_any_round_trips_payload() {
        let action = Action::new("greet", "hello".to_string());
        let any = action.to_any().unwrap();
        let back: String = any.payload.deserialize().unwrap();
        assert_eq!(back, "hello");
    }
}
