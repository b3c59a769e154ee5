//! # Supervisor strategies: how dispatched actions become running instances.
//!
//! Every registered thunk gets one supervisor task. The supervisor owns a
//! pattern-filtered bus subscription and turns matching actions into handler
//! instances according to its [`Strategy`].
//!
//! ## Architecture
//! ```text
//!                    ┌──────────────────────────────┐
//!  ActionBus ──sub──►│ Supervisor (one per thunk)   │
//!                    │  ┌ Every    spawn all        │
//!                    │  ├ Latest   halt prior, spawn│──► Registration::invoke_guarded
//!                    │  ├ Leading  run, drop burst  │
//!                    │  ├ Poll     repeat until stop│
//!                    │  └ Throttle suppress in win  │
//!                    └──────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Handler failures never kill the supervisor: instances run through
//!   `invoke_guarded`, which publishes a `thunk/error` diagnostic instead.
//! - A strategy loop that itself fails is resumed with backoff via
//!   [`run_with_retry`]; each resume publishes a `supervisor/retry` action.
//! - Cancellation of the runtime token stops the loop; in-flight instances
//!   are halted (`Every`/`Throttle` abort, `Latest`/`Leading` are raced
//!   against the token).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::actions::{Action, ActionBus, Pattern, Subscription, CLEAR_THROTTLE_KIND, SUPERVISOR_RETRY_KIND};
use crate::config::Config;
use crate::error::ThunkError;
use crate::policies::BackoffPolicy;

use super::creator::Registration;

/// Concurrency policy for one thunk's instances.
#[derive(Clone, Debug, Default)]
pub enum Strategy {
    /// Run every dispatched action; instances overlap freely.
    #[default]
    Every,

    /// A new dispatch halts the running instance before starting its own.
    Latest,

    /// The first dispatch wins; actions arriving while it runs are dropped,
    /// not queued.
    Leading,

    /// One dispatch starts a repeat loop: invoke, sleep, invoke, ... until
    /// the next matching action (or `cancel_kind`, if set) stops it.
    Poll {
        /// Sleep between iterations; `None` uses `Config::poll_interval`.
        /// The triggering action's payload may override it per dispatch
        /// via an `"interval"` field (milliseconds).
        interval: Option<Duration>,
        /// Dedicated stop-signal kind; `None` means any matching action stops.
        cancel_kind: Option<String>,
    },

    /// At most one instance per key within a sliding window; later dispatches
    /// with the same key inside the window are suppressed.
    Throttle {
        /// Length of the suppression window, armed at instance start.
        window: Duration,
    },
}

/// One thunk's supervision loop, parameterized by strategy.
pub(crate) struct Supervisor {
    bus: ActionBus,
    reg: Arc<Registration>,
    strategy: Strategy,
    poll_default: Duration,
    backoff: BackoffPolicy,
    retries: u32,
}

impl Supervisor {
    pub(crate) fn new(
        bus: ActionBus,
        reg: Arc<Registration>,
        strategy: Strategy,
        cfg: &Config,
    ) -> Self {
        Self {
            bus,
            reg,
            strategy,
            poll_default: cfg.poll_interval,
            backoff: cfg.supervisor_backoff.clone(),
            retries: cfg.supervisor_retries,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.reg.name()
    }

    /// The bus pattern this supervisor must subscribe with.
    ///
    /// Poll and throttle strategies consume their control signals through the
    /// same subscription, so ordering against regular dispatches is preserved.
    pub(crate) fn pattern(&self) -> Pattern {
        let own = Pattern::kind(self.reg.name());
        match &self.strategy {
            Strategy::Poll {
                cancel_kind: Some(cancel),
                ..
            } => Pattern::AnyOf(vec![own, Pattern::kind(cancel.clone())]),
            Strategy::Throttle { .. } => {
                Pattern::AnyOf(vec![own, Pattern::kind(CLEAR_THROTTLE_KIND)])
            }
            _ => own,
        }
    }

    /// Runs the supervision loop until cancellation or bus close, resuming
    /// crashed loops per the configured backoff.
    pub(crate) async fn run(self, first: Subscription, token: CancellationToken) {
        debug!(thunk = %self.reg.name(), strategy = ?self.strategy, "supervisor started");
        let this = &self;
        let token_ref = &token;
        let mut first = Some(first);
        run_with_retry(
            self.reg.name(),
            &self.bus,
            &token,
            self.backoff.clone(),
            self.retries,
            move || {
                let sub = first
                    .take()
                    .unwrap_or_else(|| this.bus.subscribe(this.pattern()));
                Box::pin(this.run_strategy(sub, token_ref))
            },
        )
        .await;
        debug!(thunk = %self.reg.name(), "supervisor stopped");
    }

    async fn run_strategy(
        &self,
        sub: Subscription,
        token: &CancellationToken,
    ) -> Result<(), ThunkError> {
        match &self.strategy {
            Strategy::Every => self.run_every(sub, token).await,
            Strategy::Latest => self.run_latest(sub, token).await,
            Strategy::Leading => self.run_leading(sub, token).await,
            Strategy::Poll { interval, .. } => {
                self.run_poll(sub, token, interval.unwrap_or(self.poll_default))
                    .await
            }
            Strategy::Throttle { window } => self.run_throttle(sub, token, *window).await,
        }
    }

    async fn run_every(
        &self,
        mut sub: Subscription,
        token: &CancellationToken,
    ) -> Result<(), ThunkError> {
        let mut instances = JoinSet::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                action = sub.next() => {
                    let Some(action) = action else { break };
                    let reg = Arc::clone(&self.reg);
                    let bus = self.bus.clone();
                    instances.spawn(async move { reg.invoke_guarded(&bus, action).await });
                    // Reap finished instances so the set does not grow unbounded.
                    while instances.try_join_next().is_some() {}
                }
            }
        }
        instances.shutdown().await;
        Ok(())
    }

    async fn run_latest(
        &self,
        mut sub: Subscription,
        token: &CancellationToken,
    ) -> Result<(), ThunkError> {
        let mut current: Option<(CancellationToken, JoinHandle<()>)> = None;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                action = sub.next() => {
                    let Some(action) = action else { break };
                    if let Some((halt, join)) = current.take() {
                        halt.cancel();
                        let _ = join.await;
                    }
                    let halt = token.child_token();
                    let instance_halt = halt.clone();
                    let reg = Arc::clone(&self.reg);
                    let bus = self.bus.clone();
                    let join = tokio::spawn(async move {
                        tokio::select! {
                            _ = instance_halt.cancelled() => {}
                            _ = reg.invoke_guarded(&bus, action) => {}
                        }
                    });
                    current = Some((halt, join));
                }
            }
        }
        if let Some((halt, join)) = current.take() {
            halt.cancel();
            let _ = join.await;
        }
        Ok(())
    }

    async fn run_leading(
        &self,
        mut sub: Subscription,
        token: &CancellationToken,
    ) -> Result<(), ThunkError> {
        loop {
            let action = tokio::select! {
                _ = token.cancelled() => break,
                action = sub.next() => match action {
                    Some(action) => action,
                    None => break,
                },
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.reg.invoke_guarded(&self.bus, action) => {}
            }
            // Everything dispatched during the busy period is dropped.
            sub.drain();
        }
        Ok(())
    }

    async fn run_poll(
        &self,
        mut sub: Subscription,
        token: &CancellationToken,
        interval: Duration,
    ) -> Result<(), ThunkError> {
        let own_kind = self.reg.name();
        'idle: loop {
            // Wait for a trigger of our own kind; stray stop signals while
            // idle are ignored.
            let trigger = loop {
                tokio::select! {
                    _ = token.cancelled() => break 'idle,
                    action = sub.next() => match action {
                        None => break 'idle,
                        Some(action) if action.kind.as_ref() == own_kind => break action,
                        Some(_) => continue,
                    },
                }
            };
            let every = poll_interval_override(&trigger).unwrap_or(interval);
            loop {
                self.reg.invoke_guarded(&self.bus, trigger.clone()).await;
                tokio::select! {
                    _ = token.cancelled() => break 'idle,
                    _ = time::sleep(every) => {}
                    action = sub.next() => match action {
                        // Any matching action stops the repeat loop.
                        Some(_) => break,
                        None => break 'idle,
                    },
                }
            }
        }
        Ok(())
    }

    async fn run_throttle(
        &self,
        mut sub: Subscription,
        token: &CancellationToken,
        window: Duration,
    ) -> Result<(), ThunkError> {
        let mut deadlines: HashMap<Arc<str>, Instant> = HashMap::new();
        let mut instances = JoinSet::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                action = sub.next() => {
                    let Some(action) = action else { break };
                    if action.kind.as_ref() == CLEAR_THROTTLE_KIND {
                        clear_windows(&mut deadlines, &action);
                        continue;
                    }
                    let now = Instant::now();
                    deadlines.retain(|_, deadline| *deadline > now);
                    let key = action.key_or_name().unwrap_or_else(|| action.kind.clone());
                    if deadlines.contains_key(&key) {
                        debug!(thunk = %self.reg.name(), key = %key, "throttled");
                        continue;
                    }
                    deadlines.insert(key, now + window);
                    let reg = Arc::clone(&self.reg);
                    let bus = self.bus.clone();
                    instances.spawn(async move { reg.invoke_guarded(&bus, action).await });
                    while instances.try_join_next().is_some() {}
                }
            }
        }
        instances.shutdown().await;
        Ok(())
    }
}

/// Per-dispatch poll interval override: payload `{"interval": <ms>}`.
fn poll_interval_override(action: &Action) -> Option<Duration> {
    action
        .payload
        .as_ref()
        .and_then(|p| p.get("interval"))
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
}

/// Applies a clear signal: payload `{"key": "<key>"}` clears one window,
/// no payload (or no `"key"` field) clears all of them.
fn clear_windows(deadlines: &mut HashMap<Arc<str>, Instant>, action: &Action) {
    match action
        .payload
        .as_ref()
        .and_then(|p| p.get("key"))
        .and_then(Value::as_str)
    {
        Some(key) => {
            deadlines.remove(key);
        }
        None => deadlines.clear(),
    }
}

/// Drives a supervisor loop, resuming it with backoff after failures.
///
/// Each resume publishes a `supervisor/retry` diagnostic action carrying the
/// attempt number; exhausting `retries` publishes a final one flagged
/// `"gave_up": true` and ends the loop permanently. Only the delay between
/// resumes races the cancellation token.
pub(crate) async fn run_with_retry<'a, F>(
    name: &'a str,
    bus: &'a ActionBus,
    token: &'a CancellationToken,
    backoff: BackoffPolicy,
    retries: u32,
    mut loop_factory: F,
) where
    F: FnMut() -> BoxFuture<'a, Result<(), ThunkError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if token.is_cancelled() {
            break;
        }
        match loop_factory().await {
            Ok(()) => break,
            Err(err) => {
                warn!(
                    thunk = name,
                    error = %err,
                    label = err.as_label(),
                    attempt,
                    "supervisor loop failed"
                );
                if attempt >= retries {
                    bus.dispatch(
                        Action::new(SUPERVISOR_RETRY_KIND)
                            .with_name(name)
                            .with_error()
                            .with_meta("reason", json!(err.to_string()))
                            .with_meta("attempt", json!(attempt))
                            .with_meta("gave_up", json!(true)),
                    );
                    warn!(thunk = name, attempt, "supervisor retries exhausted");
                    break;
                }
                let delay = backoff.next(attempt);
                attempt += 1;
                bus.dispatch(
                    Action::new(SUPERVISOR_RETRY_KIND)
                        .with_name(name)
                        .with_error()
                        .with_meta("reason", json!(err.to_string()))
                        .with_meta("attempt", json!(attempt)),
                );
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = time::sleep(delay) => {}
                }
            }
        }
    }
}
