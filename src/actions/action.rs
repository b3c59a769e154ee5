//! # Actions dispatched onto the bus.
//!
//! An [`Action`] is an immutable event record: a `kind` (type string), an
//! optional JSON payload, optional metadata, and an `error` flag for
//! diagnostic actions. Thunk-created actions additionally carry the thunk
//! `name` and the derived `key` identity.
//!
//! ## Ordering guarantees
//! Each action has a globally unique sequence number (`seq`) assigned at
//! creation, increasing monotonically. Use `seq` to restore the exact
//! dispatch order when observing actions from multiple subscriptions.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use thunkvisor::Action;
//!
//! let action = Action::new("todos/add")
//!     .with_payload(json!({ "title": "write docs" }))
//!     .with_meta("source", json!("cli"));
//!
//! assert_eq!(action.kind.as_ref(), "todos/add");
//! assert!(!action.error);
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde_json::{Map, Value};

/// Global sequence counter for dispatch ordering.
static ACTION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Kind of the diagnostic action published when a handler errors.
pub const ERROR_KIND: &str = "thunk/error";

/// Kind of the action published by the store after every commit.
pub const STORE_UPDATED_KIND: &str = "store/updated";

/// Kind of the diagnostic action published when a supervisor loop is resumed.
pub const SUPERVISOR_RETRY_KIND: &str = "supervisor/retry";

/// Kind of the clear-signal consumed by the timer-throttle strategy.
///
/// A payload `{ "key": "<key>" }` clears one throttle window; no payload
/// clears all windows for the subscribed thunk.
pub const CLEAR_THROTTLE_KIND: &str = "thunk/clear_throttle";

/// Immutable event record flowing through the action bus.
///
/// - `seq`: monotonic global sequence for ordering
/// - `kind`: the type string subscribers match on
/// - other optional fields are set depending on the producer
#[derive(Clone, Debug)]
pub struct Action {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Type string; thunk actions use the thunk name as their kind.
    pub kind: Arc<str>,
    /// Optional JSON payload.
    pub payload: Option<Value>,
    /// Optional metadata map.
    pub meta: Option<Map<String, Value>>,
    /// Marks diagnostic/error actions.
    pub error: bool,
    /// Thunk name, for actions created by an action creator.
    pub name: Option<Arc<str>>,
    /// Derived identity key, for actions created by an action creator.
    pub key: Option<Arc<str>>,
}

impl Action {
    /// Creates a new action of the given kind with the next sequence number.
    pub fn new(kind: impl Into<Arc<str>>) -> Self {
        Self {
            seq: ACTION_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind: kind.into(),
            payload: None,
            meta: None,
            error: false,
            name: None,
            key: None,
        }
    }

    /// Attaches a payload.
    #[inline]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Inserts one metadata entry, creating the map on first use.
    #[inline]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Marks this action as a diagnostic/error action.
    #[inline]
    pub fn with_error(mut self) -> Self {
        self.error = true;
        self
    }

    /// Attaches the originating thunk name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches the derived identity key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Creates the diagnostic action for a failed handler.
    #[inline]
    pub fn handler_error(name: impl Into<Arc<str>>, reason: impl Into<String>) -> Self {
        Action::new(ERROR_KIND)
            .with_name(name)
            .with_meta("reason", Value::String(reason.into()))
            .with_error()
    }

    /// Returns the key if present, else falls back to the thunk name.
    #[inline]
    pub fn key_or_name(&self) -> Option<Arc<str>> {
        self.key.clone().or_else(|| self.name.clone())
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error
    }
}
