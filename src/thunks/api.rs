//! # Thunk registry: create, route, register, manage, shut down.
//!
//! [`Thunks`] is the coordination surface of the runtime. Handlers are
//! declared with [`create`](Thunks::create) (returning an [`ActionCreator`]),
//! wired to the action bus with [`register`](Thunks::register), and torn down
//! with [`shutdown`](Thunks::shutdown).
//!
//! ## Architecture
//! ```text
//!   create()/manage() ──► pending queue ──► register(&store)
//!                                              │
//!                              ┌───────────────┴───────────────┐
//!                              ▼                               ▼
//!                     Supervisor task per thunk        Resource task per manage
//!                     (subscribed BEFORE spawn)        (provides into its slot)
//!                              │                               │
//!                              └────────── root token ─────────┘
//!                                         shutdown(): cancel + grace wait
//! ```
//!
//! ## Rules
//! - Declarations are inert until `register` is called; the first `register`
//!   wires everything queued so far **before returning**, so an action
//!   dispatched right after it is observed by every supervisor.
//! - `register` is idempotent per store; later calls (same or different
//!   store) are no-ops for already-wired declarations, while declarations
//!   made after registration are picked up by a background drain.
//! - Duplicate thunk names keep the first registration and log a warning.
//! - `shutdown` cancels the root token and waits up to `Config::grace`;
//!   stuck tasks are reported via [`ConfigError::GraceExceeded`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::actions::{Action, ActionBus};
use crate::config::Config;
use crate::error::ConfigError;
use crate::middleware::{DynMiddleware, MiddlewareFn};
use crate::store::Store;

use super::creator::{ActionCreator, Registration};
use super::resource::{slot_pair, ResourceHandle, ResourceRef, ResourceSlot};
use super::supervisor::{Strategy, Supervisor};

/// Per-thunk declaration options.
#[derive(Clone, Debug, Default)]
pub struct ThunkOptions {
    /// Concurrency strategy for this thunk's instances.
    pub strategy: Strategy,
}

/// Declarations queued between `create`/`manage` and `register`.
enum Pending {
    Supervisor(Supervisor),
    Resource {
        name: Arc<str>,
        resource: ResourceRef,
        slot: ResourceSlot,
    },
}

struct ThunksInner {
    bus: ActionBus,
    cfg: Config,
    /// Name → registration; first declaration wins.
    regs: StdRwLock<HashMap<String, Arc<Registration>>>,
    /// Instance-wide stages prepended to every thunk's pipeline.
    base: Arc<StdRwLock<Vec<DynMiddleware>>>,
    pending_tx: mpsc::UnboundedSender<Pending>,
    /// Taken by the first `register` call; `None` afterwards.
    pending_rx: StdMutex<Option<mpsc::UnboundedReceiver<Pending>>>,
    /// Store ids already registered against.
    registered: StdMutex<HashSet<u64>>,
    root: CancellationToken,
    /// Spawned supervisor/resource tasks, labeled for shutdown reporting.
    tasks: StdMutex<Vec<(String, JoinHandle<()>)>>,
}

/// The thunk runtime handle.
///
/// Cheap to clone; all clones share one registry, pending queue, and root
/// cancellation token.
#[derive(Clone)]
pub struct Thunks {
    inner: Arc<ThunksInner>,
}

impl Thunks {
    /// Creates a runtime over the given bus.
    pub fn new(bus: ActionBus, cfg: Config) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ThunksInner {
                bus,
                cfg,
                regs: StdRwLock::new(HashMap::new()),
                base: Arc::new(StdRwLock::new(Vec::new())),
                pending_tx,
                pending_rx: StdMutex::new(Some(pending_rx)),
                registered: StdMutex::new(HashSet::new()),
                root: CancellationToken::new(),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// The bus this runtime dispatches to and supervises from.
    pub fn bus(&self) -> &ActionBus {
        &self.inner.bus
    }

    /// Declares a thunk with the default strategy (every dispatch runs).
    pub fn create(&self, name: &str, stages: Vec<DynMiddleware>) -> ActionCreator {
        self.create_with(name, ThunkOptions::default(), stages)
    }

    /// Declares a thunk with explicit options.
    ///
    /// A duplicate name keeps the first registration: the returned creator
    /// points at the existing thunk and a warning is logged.
    pub fn create_with(
        &self,
        name: &str,
        opts: ThunkOptions,
        stages: Vec<DynMiddleware>,
    ) -> ActionCreator {
        let mut regs = self
            .inner
            .regs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = regs.get(name) {
            warn!(thunk = name, "duplicate thunk name; keeping first registration");
            return ActionCreator::new(Arc::clone(existing));
        }
        let reg = Registration::new(name, Arc::clone(&self.inner.base), stages);
        regs.insert(name.to_string(), Arc::clone(&reg));
        drop(regs);

        let supervisor = Supervisor::new(
            self.inner.bus.clone(),
            Arc::clone(&reg),
            opts.strategy,
            &self.inner.cfg,
        );
        // Receiver is held by the registry for its whole life; send cannot fail.
        let _ = self.inner.pending_tx.send(Pending::Supervisor(supervisor));
        ActionCreator::new(reg)
    }

    /// Appends an instance-wide stage, prepended to every thunk's pipeline
    /// (including thunks declared earlier).
    pub fn use_middleware(&self, stage: DynMiddleware) {
        self.inner
            .base
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(stage);
    }

    /// Returns a router stage embeddable in an outer pipeline.
    ///
    /// A context whose `name` matches a registered thunk is handled by that
    /// thunk's full pipeline, exactly as a supervised dispatch would run it:
    /// instance-wide stages first, then the thunk's own stages, then the
    /// dynamic override. Anything else falls through to the next outer stage.
    ///
    /// Because the router already applies the instance-wide stages, they must
    /// not be composed into the outer pipeline as well; doing so runs them
    /// twice for routed contexts.
    pub fn routes(&self) -> DynMiddleware {
        let inner = Arc::clone(&self.inner);
        MiddlewareFn::arc(move |ctx, next| {
            let reg = inner
                .regs
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(ctx.name.as_ref())
                .cloned();
            async move {
                match reg {
                    Some(reg) => reg.invoke_ctx(ctx).await,
                    None => next.run(ctx).await,
                }
            }
        })
    }

    /// Hands a long-lived resource to the runtime; it starts at `register`
    /// and is cancelled at `shutdown`.
    ///
    /// The returned handle is usable immediately: `get()` is `None` until
    /// the resource provides a value.
    pub fn manage(&self, name: &str, resource: ResourceRef) -> ResourceHandle {
        let (slot, handle) = slot_pair(name);
        let _ = self.inner.pending_tx.send(Pending::Resource {
            name: Arc::from(name),
            resource,
            slot,
        });
        handle
    }

    /// Wires queued declarations to the bus and the given store.
    ///
    /// Must be called inside a tokio runtime. Idempotent per store; every
    /// queued supervisor subscribes before this returns, so actions
    /// dispatched immediately afterwards are observed. Declarations made
    /// after this call are wired by a background drain task.
    pub fn register(&self, store: &Store) {
        {
            let mut registered = self
                .inner
                .registered
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !registered.insert(store.id()) {
                return;
            }
        }
        debug!(store = store.id(), "registering thunks");

        let rx = self
            .inner
            .pending_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        // Another store already owns the drain; its loop picks everything up.
        let Some(mut rx) = rx else { return };

        // Wire everything queued so far synchronously.
        while let Ok(pending) = rx.try_recv() {
            self.spawn_pending(pending);
        }

        let this = self.clone();
        let token = self.inner.root.child_token();
        let drain = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    pending = rx.recv() => match pending {
                        Some(pending) => this.spawn_pending(pending),
                        None => break,
                    },
                }
            }
        });
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(("registry:drain".to_string(), drain));
    }

    fn spawn_pending(&self, pending: Pending) {
        match pending {
            Pending::Supervisor(supervisor) => {
                let label = format!("thunk:{}", supervisor.name());
                // Subscribe before spawning so no dispatch slips past startup.
                let sub = self.inner.bus.subscribe(supervisor.pattern());
                let token = self.inner.root.child_token();
                let handle = tokio::spawn(supervisor.run(sub, token));
                self.inner
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((label, handle));
            }
            Pending::Resource {
                name,
                resource,
                slot,
            } => {
                let label = format!("resource:{name}");
                let token = self.inner.root.child_token();
                let handle = tokio::spawn(async move {
                    if let Err(err) = resource.start(slot, token).await {
                        warn!(resource = %name, error = %err, "resource ended with error");
                    }
                });
                self.inner
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((label, handle));
            }
        }
    }

    /// Dispatches one action onto the bus.
    pub fn dispatch(&self, action: Action) {
        self.inner.bus.dispatch(action);
    }

    /// Dispatches a batch in order; an empty batch is a no-op.
    pub fn dispatch_all(&self, actions: Vec<Action>) {
        self.inner.bus.dispatch_all(actions);
    }

    /// Cancels every supervisor and resource task and waits for them to exit.
    ///
    /// Waits up to `Config::grace` in total; tasks that fail to stop in time
    /// are reported in [`ConfigError::GraceExceeded`] and left to the runtime
    /// to tear down.
    pub async fn shutdown(&self) -> Result<(), ConfigError> {
        self.inner.root.cancel();
        let tasks: Vec<(String, JoinHandle<()>)> = {
            let mut guard = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };

        let deadline = Instant::now() + self.inner.cfg.grace;
        let mut stuck = Vec::new();
        for (label, handle) in tasks {
            match time::timeout_at(deadline, handle).await {
                Ok(_) => {}
                Err(_) => stuck.push(label),
            }
        }
        if stuck.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::GraceExceeded {
                grace: self.inner.cfg.grace,
                stuck,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use crate::actions::{Pattern, ERROR_KIND, CLEAR_THROTTLE_KIND};
    use crate::error::ThunkError;
    use crate::middleware::{compose, Ctx, Next};
    use crate::thunks::resource::ResourceFn;

    fn setup() -> (ActionBus, Store, Thunks) {
        let bus = ActionBus::new(64);
        let store = Store::new(bus.clone(), vec![]).expect("empty store");
        let thunks = Thunks::new(bus.clone(), Config::default());
        (bus, store, thunks)
    }

    /// Stage that bumps a counter, optionally sleeping first.
    fn counting_stage(counter: Arc<AtomicUsize>, busy: Duration) -> DynMiddleware {
        MiddlewareFn::arc(move |ctx: Ctx, next: Next| {
            let counter = Arc::clone(&counter);
            async move {
                if !busy.is_zero() {
                    time::sleep(busy).await;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(ctx).await
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_strategy_overlaps_instances() {
        let (_bus, store, thunks) = setup();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let stage = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            MiddlewareFn::arc(move |ctx: Ctx, next: Next| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(50)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    next.run(ctx).await
                }
            })
        };
        let fetch = thunks.create("fetch", vec![stage]);
        thunks.register(&store);

        thunks.dispatch(fetch.action_with(json!({ "id": "1" })));
        thunks.dispatch(fetch.action_with(json!({ "id": "2" })));
        time::sleep(Duration::from_millis(200)).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_strategy_halts_previous_instance() {
        let (_bus, store, thunks) = setup();
        let completed = Arc::new(AtomicUsize::new(0));
        let search = thunks.create_with(
            "search",
            ThunkOptions {
                strategy: Strategy::Latest,
            },
            vec![counting_stage(
                Arc::clone(&completed),
                Duration::from_millis(50),
            )],
        );
        thunks.register(&store);

        thunks.dispatch(search.action_with(json!({ "q": "a" })));
        thunks.dispatch(search.action_with(json!({ "q": "ab" })));
        time::sleep(Duration::from_millis(300)).await;

        // The first instance was halted before finishing; only the second completed.
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leading_strategy_drops_burst() {
        let (_bus, store, thunks) = setup();
        let completed = Arc::new(AtomicUsize::new(0));
        let submit = thunks.create_with(
            "submit",
            ThunkOptions {
                strategy: Strategy::Leading,
            },
            vec![counting_stage(
                Arc::clone(&completed),
                Duration::from_millis(50),
            )],
        );
        thunks.register(&store);

        thunks.dispatch(submit.action());
        thunks.dispatch(submit.action());
        thunks.dispatch(submit.action());
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);

        // After the busy period, the next dispatch runs normally.
        thunks.dispatch(submit.action());
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_strategy_repeats_until_stopped() {
        let (_bus, store, thunks) = setup();
        let ticks = Arc::new(AtomicUsize::new(0));
        let poll = thunks.create_with(
            "poll/status",
            ThunkOptions {
                strategy: Strategy::Poll {
                    interval: Some(Duration::from_millis(100)),
                    cancel_kind: Some("poll/stop".to_string()),
                },
            },
            vec![counting_stage(Arc::clone(&ticks), Duration::ZERO)],
        );
        thunks.register(&store);

        thunks.dispatch(poll.action());
        time::sleep(Duration::from_millis(250)).await;
        // Iterations at t = 0, 100, 200.
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        thunks.dispatch(Action::new("poll/stop"));
        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        // A fresh trigger resumes polling.
        thunks.dispatch(poll.action());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_same_type_redispatch_stops_loop() {
        let (_bus, store, thunks) = setup();
        let ticks = Arc::new(AtomicUsize::new(0));
        let watch = thunks.create_with(
            "poll/watch",
            ThunkOptions {
                strategy: Strategy::Poll {
                    interval: Some(Duration::from_millis(100)),
                    cancel_kind: None,
                },
            },
            vec![counting_stage(Arc::clone(&ticks), Duration::ZERO)],
        );
        thunks.register(&store);

        thunks.dispatch(watch.action());
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        // Without a dedicated cancel kind, re-dispatching the same type is
        // the stop signal; it is consumed, not treated as a new trigger.
        thunks.dispatch(watch.action());
        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        // The dispatch after the stop starts a fresh repeat loop.
        thunks.dispatch(watch.action());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_payload_override() {
        let (_bus, store, thunks) = setup();
        let ticks = Arc::new(AtomicUsize::new(0));
        let poll = thunks.create_with(
            "poll/fast",
            ThunkOptions {
                strategy: Strategy::Poll {
                    interval: Some(Duration::from_millis(500)),
                    cancel_kind: Some("poll/fast_stop".to_string()),
                },
            },
            vec![counting_stage(Arc::clone(&ticks), Duration::ZERO)],
        );
        thunks.register(&store);

        thunks.dispatch(poll.action_with(json!({ "interval": 50 })));
        time::sleep(Duration::from_millis(120)).await;
        // Overridden cadence: t = 0, 50, 100.
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_strategy_suppresses_within_window() {
        let (_bus, store, thunks) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let save = thunks.create_with(
            "save",
            ThunkOptions {
                strategy: Strategy::Throttle {
                    window: Duration::from_millis(100),
                },
            },
            vec![counting_stage(Arc::clone(&runs), Duration::ZERO)],
        );
        thunks.register(&store);

        thunks.dispatch(save.action_with(json!({ "doc": 1 })));
        thunks.dispatch(save.action_with(json!({ "doc": 1 })));
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // A distinct key is unaffected by doc 1's window.
        thunks.dispatch(save.action_with(json!({ "doc": 2 })));
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Window expired: the same key fires again.
        time::sleep(Duration::from_millis(120)).await;
        thunks.dispatch(save.action_with(json!({ "doc": 1 })));
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_clear_signal_reopens_window() {
        let (_bus, store, thunks) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let save = thunks.create_with(
            "save/profile",
            ThunkOptions {
                strategy: Strategy::Throttle {
                    window: Duration::from_secs(60),
                },
            },
            vec![counting_stage(Arc::clone(&runs), Duration::ZERO)],
        );
        thunks.register(&store);

        let action = save.action_with(json!({ "id": 7 }));
        let key = action.key.clone().expect("creator sets a key");
        thunks.dispatch(action.clone());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        thunks.dispatch(
            Action::new(CLEAR_THROTTLE_KIND).with_payload(json!({ "key": key.as_ref() })),
        );
        thunks.dispatch(action);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_is_idempotent_per_store() {
        let (bus, store, thunks) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let ping = thunks.create("ping", vec![counting_stage(Arc::clone(&runs), Duration::ZERO)]);

        thunks.register(&store);
        thunks.register(&store);
        let other = Store::new(bus.clone(), vec![]).expect("store");
        thunks.register(&other);

        thunks.dispatch(ping.action());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_name_keeps_first_registration() {
        let (_bus, store, thunks) = setup();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let _a = thunks.create("dup", vec![counting_stage(Arc::clone(&first), Duration::ZERO)]);
        let b = thunks.create("dup", vec![counting_stage(Arc::clone(&second), Duration::ZERO)]);
        thunks.register(&store);

        thunks.dispatch(b.action());
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_create_is_wired_by_drain() {
        let (_bus, store, thunks) = setup();
        thunks.register(&store);

        let runs = Arc::new(AtomicUsize::new(0));
        let late = thunks.create("late", vec![counting_stage(Arc::clone(&runs), Duration::ZERO)]);
        // Let the drain task wire the new supervisor.
        time::sleep(Duration::from_millis(10)).await;

        thunks.dispatch(late.action());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_failure_publishes_diagnostic_and_survives() {
        let (bus, store, thunks) = setup();
        let mut errors = bus.subscribe(Pattern::kind(ERROR_KIND));
        let failing = MiddlewareFn::arc(|_ctx: Ctx, _next: Next| async move {
            Err(ThunkError::fail("backend down"))
        });
        let sync = thunks.create("sync", vec![failing]);
        thunks.register(&store);

        thunks.dispatch(sync.action());
        let diag = errors.next().await.expect("diagnostic action");
        assert!(diag.error);
        assert_eq!(diag.name.as_deref(), Some("sync"));

        // The supervisor survived the failure and handles the next dispatch.
        thunks.dispatch(sync.action());
        assert!(errors.next().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_instance_wide_middleware_applies_to_all_thunks() {
        let (_bus, store, thunks) = setup();
        let seen = Arc::new(AtomicUsize::new(0));
        thunks.use_middleware(counting_stage(Arc::clone(&seen), Duration::ZERO));

        let a = thunks.create("a", vec![]);
        let b = thunks.create("b", vec![]);
        thunks.register(&store);

        thunks.dispatch(a.action());
        thunks.dispatch(b.action());
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routes_invokes_matching_thunk_and_falls_through() {
        let (_bus, _store, thunks) = setup();
        let fetch = thunks.create(
            "fetch/user",
            vec![MiddlewareFn::arc(|mut ctx: Ctx, next: Next| async move {
                ctx.result = Some(json!("routed"));
                next.run(ctx).await
            })],
        );

        let outer = compose(vec![thunks.routes()]);

        let handled = outer
            .run(Ctx::from_action(fetch.action()), None)
            .await
            .expect("routed");
        assert_eq!(handled.result, Some(json!("routed")));

        let passed = outer
            .run(Ctx::from_action(Action::new("unrelated")), None)
            .await
            .expect("falls through");
        assert!(passed.result.is_none());
    }

    #[tokio::test]
    async fn test_routes_applies_instance_stages_once() {
        let (_bus, _store, thunks) = setup();
        let seen = Arc::new(AtomicUsize::new(0));
        thunks.use_middleware(counting_stage(Arc::clone(&seen), Duration::ZERO));
        let fetch = thunks.create("fetch/one", vec![]);

        // The router carries the instance-wide stages itself; the outer
        // pipeline holds only the router.
        let outer = compose(vec![thunks.routes()]);
        outer
            .run(Ctx::from_action(fetch.action()), None)
            .await
            .expect("routed");

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resource_lifecycle() {
        let (_bus, store, thunks) = setup();
        let cleaned = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&cleaned);
        let handle = thunks.manage(
            "db",
            ResourceFn::arc(move |slot, token| {
                let flag = Arc::clone(&flag);
                async move {
                    slot.provide(json!({ "pool": 4 }));
                    token.cancelled().await;
                    flag.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        // Inert before register.
        assert_eq!(handle.get(), None);
        assert!(matches!(
            handle.expect(),
            Err(ThunkError::Unavailable { .. }),
        ));

        thunks.register(&store);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.expect().expect("provided"), json!({ "pool": 4 }));

        thunks.shutdown().await.expect("graceful shutdown");
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stuck_tasks() {
        let bus = ActionBus::new(16);
        let store = Store::new(bus.clone(), vec![]).expect("store");
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..Config::default()
        };
        let thunks = Thunks::new(bus, cfg);

        let _handle = thunks.manage(
            "stubborn",
            ResourceFn::arc(|_slot, _token| async move {
                // Ignores its token entirely.
                std::future::pending::<()>().await;
                Ok(())
            }),
        );
        thunks.register(&store);
        time::sleep(Duration::from_millis(10)).await;

        let err = thunks.shutdown().await.expect_err("stuck resource");
        match err {
            ConfigError::GraceExceeded { stuck, .. } => {
                assert!(stuck.iter().any(|label| label.as_str() == "resource:stubborn"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
