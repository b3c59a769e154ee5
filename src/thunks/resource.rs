//! # Managed resources: long-lived values with a lifecycle.
//!
//! A [`Resource`] is a long-lived operation (a connection, a watcher, a
//! session) started by the runtime and cancelled on shutdown. It publishes
//! its current value through a [`ResourceSlot`]; callers read it through the
//! [`ResourceHandle`] returned by `Thunks::manage`.
//!
//! ## Rules
//! - `get()` returns `None` until the resource first calls `provide()`.
//! - `expect()` turns that miss into [`ThunkError::Unavailable`] so handlers
//!   can propagate it with `?`.
//! - On shutdown the resource's token is cancelled; the `start` future is
//!   expected to run its cleanup and return.

use std::future::Future;
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ThunkError;

/// Shared resource handle type used by the registry.
pub type ResourceRef = Arc<dyn Resource>;

/// # A long-lived managed operation.
///
/// `start` runs for the lifetime of the runtime: it provides a value into
/// its slot (possibly repeatedly, e.g. on reconnect), then waits on the
/// token and cleans up when cancelled.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Runs the resource until `token` is cancelled.
    async fn start(&self, slot: ResourceSlot, token: CancellationToken) -> Result<(), ThunkError>;
}

/// Function-backed [`Resource`] for closures.
///
/// The closure is invoked once per `start` and must return a fresh future.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use thunkvisor::ResourceFn;
///
/// let pool = ResourceFn::arc(|slot, token| async move {
///     slot.provide(json!({ "connections": 4 }));
///     token.cancelled().await;
///     Ok(())
/// });
/// ```
pub struct ResourceFn<F> {
    f: F,
}

impl<F, Fut> ResourceFn<F>
where
    F: Fn(ResourceSlot, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ThunkError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Convenience constructor returning the shared handle `manage` expects.
    pub fn arc(f: F) -> ResourceRef {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Resource for ResourceFn<F>
where
    F: Fn(ResourceSlot, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ThunkError>> + Send + 'static,
{
    async fn start(&self, slot: ResourceSlot, token: CancellationToken) -> Result<(), ThunkError> {
        (self.f)(slot, token).await
    }
}

/// Write side of a managed resource's value, held by the resource itself.
#[derive(Clone)]
pub struct ResourceSlot {
    shared: Arc<StdRwLock<Option<Value>>>,
}

impl ResourceSlot {
    /// Publishes (or replaces) the resource's current value.
    pub fn provide(&self, value: Value) {
        let mut slot = self
            .shared
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(value);
    }

    /// Withdraws the current value; `get()` returns `None` again.
    pub fn clear(&self) {
        let mut slot = self
            .shared
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }
}

/// Read side of a managed resource's value, returned by `Thunks::manage`.
///
/// Cheap to clone; all clones observe the same slot.
#[derive(Clone)]
pub struct ResourceHandle {
    name: Arc<str>,
    shared: Arc<StdRwLock<Option<Value>>>,
}

impl ResourceHandle {
    /// Name the resource was managed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, `None` until the resource first provides one.
    pub fn get(&self) -> Option<Value> {
        self.shared
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current value, or [`ThunkError::Unavailable`] if none was provided yet.
    pub fn expect(&self) -> Result<Value, ThunkError> {
        self.get().ok_or_else(|| ThunkError::Unavailable {
            resource: self.name.to_string(),
        })
    }
}

/// Creates the paired write/read sides for one managed resource.
pub(crate) fn slot_pair(name: impl Into<Arc<str>>) -> (ResourceSlot, ResourceHandle) {
    let shared = Arc::new(StdRwLock::new(None));
    let slot = ResourceSlot {
        shared: Arc::clone(&shared),
    };
    let handle = ResourceHandle {
        name: name.into(),
        shared,
    };
    (slot, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handle_empty_until_provided() {
        let (slot, handle) = slot_pair("db");
        assert_eq!(handle.get(), None);
        assert!(matches!(
            handle.expect(),
            Err(ThunkError::Unavailable { ref resource }) if resource == "db",
        ));

        slot.provide(json!({ "url": "postgres://localhost" }));
        assert_eq!(handle.get(), Some(json!({ "url": "postgres://localhost" })));
    }

    #[test]
    fn test_provide_replaces_and_clear_withdraws() {
        let (slot, handle) = slot_pair("session");
        slot.provide(json!(1));
        slot.provide(json!(2));
        assert_eq!(handle.get(), Some(json!(2)));

        slot.clear();
        assert_eq!(handle.get(), None);
    }

    #[tokio::test]
    async fn test_resource_fn_runs_until_cancelled() {
        let (slot, handle) = slot_pair("ticker");
        let token = CancellationToken::new();
        let resource = ResourceFn::arc(|slot: ResourceSlot, token: CancellationToken| async move {
            slot.provide(json!("ready"));
            token.cancelled().await;
            slot.clear();
            Ok(())
        });

        let task = tokio::spawn({
            let token = token.clone();
            async move { resource.start(slot, token).await }
        });

        // Yield until the resource has provided its value.
        while handle.get().is_none() {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.get(), Some(json!("ready")));

        token.cancel();
        task.await.expect("join").expect("resource exits cleanly");
        assert_eq!(handle.get(), None);
    }
}
