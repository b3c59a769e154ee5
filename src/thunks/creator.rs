//! # Thunk registrations and action creators.
//!
//! A [`Registration`](struct@Registration) is the per-name record held by the
//! registry: the statically-declared middleware stages, the shared
//! instance-wide base stages, and a hot-swappable dynamic override.
//!
//! An [`ActionCreator`] is the caller-facing handle returned by
//! `Thunks::create`: it builds actions carrying `{name, key, payload}`,
//! is `Display`-stable (usable as a pattern), and can invoke the handler
//! directly via [`run`](ActionCreator::run), bypassing dispatch.
//!
//! ## Rules
//! - The key is computed once, at action-creation time.
//! - The dynamic override composes **after** the static stages (it runs as
//!   the pipeline tail) and is cleared by [`reset_override`](ActionCreator::reset_override).

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use serde_json::Value;
use tracing::warn;

use crate::actions::{Action, ActionBus, Pattern};
use crate::error::ThunkError;
use crate::key::derive_key;
use crate::middleware::{compose, Ctx, DynMiddleware};

/// Per-name registry record: identity plus the composed handler parts.
pub(crate) struct Registration {
    name: Arc<str>,
    /// Instance-wide stages shared by every thunk of one `Thunks` handle.
    base: Arc<StdRwLock<Vec<DynMiddleware>>>,
    /// Statically-declared stages for this thunk.
    stages: Vec<DynMiddleware>,
    /// Hot-swappable override, composed after the static stages.
    dynamic: StdMutex<Option<DynMiddleware>>,
}

impl Registration {
    pub(crate) fn new(
        name: impl Into<Arc<str>>,
        base: Arc<StdRwLock<Vec<DynMiddleware>>>,
        stages: Vec<DynMiddleware>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            base,
            stages,
            dynamic: StdMutex::new(None),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn set_override(&self, stage: DynMiddleware) {
        let mut slot = self
            .dynamic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(stage);
    }

    pub(crate) fn clear_override(&self) {
        let mut slot = self
            .dynamic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    /// Runs the full handler for one context: base stages, static stages,
    /// dynamic override as the tail.
    pub(crate) async fn invoke_ctx(&self, ctx: Ctx) -> Result<Ctx, ThunkError> {
        let stages = {
            let base = self
                .base
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut all = Vec::with_capacity(base.len() + self.stages.len());
            all.extend(base.iter().cloned());
            all.extend(self.stages.iter().cloned());
            all
        };
        let tail = self
            .dynamic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        compose(stages).run(ctx, tail).await
    }

    pub(crate) async fn invoke(&self, action: Action) -> Result<Ctx, ThunkError> {
        self.invoke_ctx(Ctx::from_action(action)).await
    }

    /// Catch-all wrapper used by supervisors: a failing instance is logged
    /// and re-published as a diagnostic action instead of escaping the loop.
    pub(crate) async fn invoke_guarded(&self, bus: &ActionBus, action: Action) {
        if let Err(err) = self.invoke(action).await {
            warn!(thunk = %self.name, error = %err, label = err.as_label(), "handler failed");
            bus.dispatch(Action::handler_error(self.name_arc(), err.to_string()));
        }
    }
}

/// Caller-facing handle for a registered thunk.
///
/// Cheap to clone; all clones share the registration (and therefore the
/// dynamic override slot).
#[derive(Clone)]
pub struct ActionCreator {
    reg: Arc<Registration>,
}

impl ActionCreator {
    pub(crate) fn new(reg: Arc<Registration>) -> Self {
        Self { reg }
    }

    /// The synthesized type string this creator dispatches (the thunk name).
    pub fn kind(&self) -> &str {
        self.reg.name()
    }

    /// Builds a payload-free action; the key is the bare name.
    pub fn action(&self) -> Action {
        let name = self.reg.name_arc();
        Action::new(Arc::clone(&name))
            .with_key(Arc::clone(&name))
            .with_name(name)
    }

    /// Builds an action carrying `payload`; the key is derived from the
    /// deep-sorted payload encoding.
    pub fn action_with(&self, payload: Value) -> Action {
        let name = self.reg.name_arc();
        let key = derive_key(&name, Some(&payload));
        Action::new(Arc::clone(&name))
            .with_key(key)
            .with_name(name)
            .with_payload(payload)
    }

    /// Invokes the handler directly with a payload-free action,
    /// bypassing dispatch and supervision.
    pub async fn run(&self) -> Result<Ctx, ThunkError> {
        self.reg.invoke(self.action()).await
    }

    /// Invokes the handler directly for the given action,
    /// bypassing dispatch and supervision.
    pub async fn run_with(&self, action: Action) -> Result<Ctx, ThunkError> {
        self.reg.invoke(action).await
    }

    /// Installs a per-instance override stage, composed after the static handler.
    pub fn use_override(&self, stage: DynMiddleware) {
        self.reg.set_override(stage);
    }

    /// Clears the override installed by [`use_override`](Self::use_override).
    pub fn reset_override(&self) {
        self.reg.clear_override();
    }
}

impl fmt::Display for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reg.name())
    }
}

impl fmt::Debug for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActionCreator").field(&self.reg.name()).finish()
    }
}

impl From<&ActionCreator> for Pattern {
    /// Creators match by their stable type string, not by invocation.
    fn from(creator: &ActionCreator) -> Self {
        Pattern::Kind(creator.kind().to_string())
    }
}
