//! # Draft builder and patches.
//!
//! State mutation is explicit: a [`Draft`] wraps a copy of the current
//! snapshot and records one [`Patch`] per operation (`set` / `remove`).
//! There is no automatic diffing — the patch list is exactly the sequence
//! of operations the mutators performed.
//!
//! Paths are dot-separated object keys (`"todos.filter"`); `set` creates
//! missing intermediate objects, `remove` is a no-op on missing paths and
//! records nothing. The empty path addresses the snapshot root.

use serde::Serialize;
use serde_json::{Map, Value};

/// Kind of a recorded mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    Set,
    Remove,
}

/// One recorded mutation against the snapshot tree.
#[derive(Clone, Debug, Serialize)]
pub struct Patch {
    /// Operation kind.
    pub op: PatchOp,
    /// Dot-separated path (empty = root).
    pub path: String,
    /// New value for `Set`; `None` for `Remove`.
    pub value: Option<Value>,
}

/// Copy-on-write builder over one snapshot.
///
/// Created per `update()` call, threaded through every mutator in that call,
/// and consumed when the commit finishes.
#[derive(Debug)]
pub struct Draft {
    root: Value,
    patches: Vec<Patch>,
}

impl Draft {
    pub(crate) fn new(root: Value) -> Self {
        Self {
            root,
            patches: Vec::new(),
        }
    }

    /// Reads the value at `path` in the draft (including pending mutations).
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Sets the value at `path`, creating missing intermediate objects.
    ///
    /// Records a `Set` patch. An empty path replaces the root.
    pub fn set(&mut self, path: &str, value: Value) {
        if path.is_empty() {
            self.root = value.clone();
        } else {
            let mut segments = path.split('.').peekable();
            let mut current = &mut self.root;
            while let Some(segment) = segments.next() {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let map = current
                    .as_object_mut()
                    .unwrap_or_else(|| unreachable!("object ensured above"));
                if segments.peek().is_none() {
                    map.insert(segment.to_string(), value.clone());
                    break;
                }
                current = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
        }
        self.patches.push(Patch {
            op: PatchOp::Set,
            path: path.to_string(),
            value: Some(value),
        });
    }

    /// Removes the value at `path`, returning it if present.
    ///
    /// Records a `Remove` patch only when something was actually removed.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        let (parent_path, leaf) = match path.rsplit_once('.') {
            Some((parent, leaf)) => (parent, leaf),
            None => ("", path),
        };

        let parent = if parent_path.is_empty() {
            Some(&mut self.root)
        } else {
            let mut current = Some(&mut self.root);
            for segment in parent_path.split('.') {
                current = current
                    .and_then(|v| v.as_object_mut())
                    .and_then(|m| m.get_mut(segment));
            }
            current
        };

        let removed = parent
            .and_then(|v| v.as_object_mut())
            .and_then(|m| m.remove(leaf));

        if removed.is_some() {
            self.patches.push(Patch {
                op: PatchOp::Remove,
                path: path.to_string(),
                value: None,
            });
        }
        removed
    }

    /// Number of patches recorded so far.
    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub(crate) fn finish(self) -> (Value, Vec<Patch>) {
        (self.root, self.patches)
    }
}
