//! # Per-invocation middleware context.
//!
//! A [`Ctx`] is created fresh for every dispatched-action execution and
//! discarded after the pipeline completes. It carries the triggering action,
//! the thunk identity (`name`, `key`), the payload, and the accumulated
//! `result`, plus a string-keyed extension map that downstream layers
//! (request/response middleware, cache flags, loader metadata) may use
//! without the core knowing their shapes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::actions::Action;

/// Mutable record threaded through one middleware pipeline execution.
#[derive(Clone, Debug)]
pub struct Ctx {
    /// The dispatched action that triggered this execution.
    pub action: Action,
    /// Thunk name (falls back to the action kind for raw actions).
    pub name: Arc<str>,
    /// Derived identity key (falls back to the name when absent).
    pub key: Arc<str>,
    /// Payload extracted from the action.
    pub payload: Option<Value>,
    /// Result accumulated by the pipeline; `None` until a stage sets it.
    pub result: Option<Value>,
    /// Downstream-layer extensions (cache flags, request/response records, ...).
    extensions: HashMap<String, Value>,
}

impl Ctx {
    /// Builds a context from a dispatched action.
    pub fn from_action(action: Action) -> Self {
        let name = action
            .name
            .clone()
            .unwrap_or_else(|| action.kind.clone());
        let key = action.key.clone().unwrap_or_else(|| name.clone());
        let payload = action.payload.clone();
        Self {
            action,
            name,
            key,
            payload,
            result: None,
            extensions: HashMap::new(),
        }
    }

    /// Stores an extension value under the given key.
    pub fn set_ext(&mut self, key: impl Into<String>, value: Value) {
        self.extensions.insert(key.into(), value);
    }

    /// Reads an extension value.
    pub fn ext(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// Removes and returns an extension value.
    pub fn take_ext(&mut self, key: &str) -> Option<Value> {
        self.extensions.remove(key)
    }
}
