//! # Schemas: named slices composed into one snapshot.
//!
//! A [`Schema`] owns a disjoint top-level subtree of the snapshot. At store
//! construction each schema contributes `initial_state()` under its name
//! (shallow merge); two schemas claiming the same name is a configuration
//! error. A schema may also supply an [`UpdateHook`] that observes every
//! committed snapshot together with its patch list.

use std::sync::Arc;

use serde_json::Value;

use super::patch::Patch;

/// Hook invoked after each commit with the new snapshot and its patches.
pub type UpdateHook = Arc<dyn Fn(&Value, &[Patch]) + Send + Sync>;

/// # A named slice of the application state.
///
/// Implementors provide the slice's initial value and, optionally, an update
/// hook. The hook runs inside the update pipeline (stage b), strictly after
/// the mutation stage completed and before notification fans out.
pub trait Schema: Send + Sync + 'static {
    /// Top-level name of the subtree this schema owns.
    fn name(&self) -> &str;

    /// Initial value of the subtree.
    fn initial_state(&self) -> Value;

    /// Optional commit observer for this schema.
    fn on_update(&self) -> Option<UpdateHook> {
        None
    }
}

/// Plain data-backed schema, convenient for composition and tests.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use thunkvisor::{Schema, SliceSchema};
///
/// let todos = SliceSchema::new("todos", json!({ "items": [] }));
/// assert_eq!(todos.name(), "todos");
/// ```
pub struct SliceSchema {
    name: String,
    initial: Value,
    hook: Option<UpdateHook>,
}

impl SliceSchema {
    /// Creates a schema with the given name and initial subtree.
    pub fn new(name: impl Into<String>, initial: Value) -> Self {
        Self {
            name: name.into(),
            initial,
            hook: None,
        }
    }

    /// Attaches a commit observer.
    pub fn with_hook(mut self, hook: UpdateHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Returns this schema as a shared handle.
    pub fn arc(self) -> Arc<dyn Schema> {
        Arc::new(self)
    }
}

impl Schema for SliceSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn initial_state(&self) -> Value {
        self.initial.clone()
    }

    fn on_update(&self) -> Option<UpdateHook> {
        self.hook.clone()
    }
}
