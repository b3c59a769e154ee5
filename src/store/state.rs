//! # Store: snapshot holder and transactional update pipeline.
//!
//! The [`Store`] holds the current immutable snapshot (`Arc<Value>`) and is
//! the **sole writer**: every mutation funnels through [`Store::update`],
//! which serializes commits behind an async mutex.
//!
//! ## Update pipeline
//! ```text
//! update(mutators)
//!   │ acquire commit lock                (linearizes concurrent update() calls)
//!   ├─ (a) apply every mutator to a Draft ─► (next snapshot, patches)
//!   ├─ (b) schema-supplied update hooks
//!   ├─ (c) dispatch "store/updated" action onto the bus   (devtools hook)
//!   ├─ (d) bump the "store changed" watch channel
//!   └─ (e) invoke raw listener callbacks
//! ```
//!
//! ## Rules
//! - Stage (a) runs to completion before (b)–(e) observe the new snapshot.
//! - All mutators of one `update()` call commit as **one** snapshot with one
//!   patch list — never two commits.
//! - `select()` is a pure read against the current snapshot; it never blocks
//!   on an in-flight commit (it sees the last committed snapshot).
//! - Raw listeners run synchronously inside the commit; keep them cheap.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};

use serde_json::{json, Map, Value};
use tokio::sync::{watch, Mutex as TokioMutex};

use crate::actions::{Action, ActionBus, STORE_UPDATED_KIND};
use crate::error::ConfigError;

use super::patch::{Draft, Patch};
use super::schema::{Schema, UpdateHook};

/// Global store identity counter, used by `Thunks::register` idempotence.
static STORE_ID: AtomicU64 = AtomicU64::new(0);

/// State mutator applied against a [`Draft`] inside one commit.
pub type Mutator = Arc<dyn Fn(&mut Draft) + Send + Sync>;

/// Raw commit listener; receives the committed snapshot.
pub type RawListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wraps a closure as a [`Mutator`].
pub fn mutator<F>(f: F) -> Mutator
where
    F: Fn(&mut Draft) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Result of one committed `update()` call.
#[derive(Clone, Debug)]
pub struct UpdaterCtx {
    /// Patches recorded by the mutators, in application order.
    pub patches: Vec<Patch>,
    /// Version of the snapshot this commit produced.
    pub version: u64,
}

struct StoreInner {
    id: u64,
    bus: ActionBus,
    snapshot: StdRwLock<Arc<Value>>,
    commit: TokioMutex<()>,
    version: watch::Sender<u64>,
    hooks: Vec<UpdateHook>,
    listeners: StdMutex<Vec<(u64, RawListener)>>,
    listener_seq: AtomicU64,
}

/// Shared, versioned application state store.
///
/// Cheap to clone; all clones observe the same snapshot and serialize their
/// commits through the same update pipeline.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("id", &self.inner.id).finish_non_exhaustive()
    }
}

impl Store {
    /// Composes the given schemas into one snapshot and creates the store.
    ///
    /// Each schema owns a disjoint top-level subtree; a duplicate name is a
    /// configuration error. The bus is shared with the thunk runtime so that
    /// commit actions are observable alongside dispatched actions.
    pub fn new(bus: ActionBus, schemas: Vec<Arc<dyn Schema>>) -> Result<Self, ConfigError> {
        let mut root = Map::new();
        let mut seen = HashSet::new();
        let mut hooks = Vec::new();

        for schema in &schemas {
            let name = schema.name().to_string();
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateSchema { name });
            }
            root.insert(name, schema.initial_state());
            if let Some(hook) = schema.on_update() {
                hooks.push(hook);
            }
        }

        let (version, _) = watch::channel(0u64);
        Ok(Self {
            inner: Arc::new(StoreInner {
                id: STORE_ID.fetch_add(1, AtomicOrdering::Relaxed),
                bus,
                snapshot: StdRwLock::new(Arc::new(Value::Object(root))),
                commit: TokioMutex::new(()),
                version,
                hooks,
                listeners: StdMutex::new(Vec::new()),
                listener_seq: AtomicU64::new(0),
            }),
        })
    }

    /// Store identity, distinct per instance.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Applies one mutator as a single commit.
    pub async fn update_one(&self, m: Mutator) -> UpdaterCtx {
        self.update(vec![m]).await
    }

    /// Applies every mutator atomically and fans out notification.
    ///
    /// Concurrently issued `update()` calls are linearized: the mutation
    /// stage of one commit never interleaves with another's.
    pub async fn update(&self, mutators: Vec<Mutator>) -> UpdaterCtx {
        let inner = &self.inner;
        let _commit = inner.commit.lock().await;

        // (a) mutation stage, run to completion before anything observes it
        let current = self.snapshot();
        let mut draft = Draft::new((*current).clone());
        for m in &mutators {
            m(&mut draft);
        }
        let (next, patches) = draft.finish();
        let next = Arc::new(next);

        {
            let mut slot = inner
                .snapshot
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Arc::clone(&next);
        }
        // Next version, published to watchers only at stage (d); the commit
        // lock makes the read-increment race-free.
        let version = *inner.version.borrow() + 1;

        // (b) schema hooks
        for hook in &inner.hooks {
            hook(&next, &patches);
        }

        // (c) observability action
        inner.bus.dispatch(
            Action::new(STORE_UPDATED_KIND).with_payload(json!({
                "version": version,
                "patches": patches,
            })),
        );

        // (d) "store changed" signal
        inner.version.send_modify(|v| *v = version);

        // (e) raw listeners
        let listeners: Vec<RawListener> = {
            let guard = inner
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(&next);
        }

        UpdaterCtx { patches, version }
    }

    /// Pure read against the current snapshot.
    pub fn select<T>(&self, selector: impl FnOnce(&Value) -> T) -> T {
        let snapshot = self.snapshot();
        selector(&snapshot)
    }

    /// Returns the current snapshot handle.
    pub fn snapshot(&self) -> Arc<Value> {
        let guard = self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Watch channel bumped once per commit ("store changed" signal).
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Registers a raw commit listener; the guard unsubscribes on drop.
    pub fn subscribe_raw(&self, listener: RawListener) -> ListenerGuard {
        let id = self.inner.listener_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, listener));
        ListenerGuard {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Unsubscribes its raw listener when dropped.
pub struct ListenerGuard {
    id: u64,
    inner: Weak<StoreInner>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut listeners = inner
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
