//! # Action bus for dispatching and observing actions.
//!
//! [`ActionBus`] is a thin wrapper around [`tokio::sync::broadcast`] that
//! provides non-blocking dispatch from multiple sources (callers, supervisors,
//! the store's update pipeline).
//!
//! ## Architecture
//! ```text
//! Dispatchers (many):                Subscribers (many):
//!   caller ────┐
//!   store  ────┼──────► ActionBus ───► Subscription S1 (pattern-filtered)
//!   thunks ────┤      (broadcast chan) Subscription S2 (pattern-filtered)
//!   catch-all ─┘                       Subscription SN (pattern-filtered)
//! ```
//!
//! ## Rules
//! - **Non-blocking dispatch**: `dispatch()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent actions for all receivers.
//! - **Backlog buffering**: actions dispatched while a subscriber processes are
//!   retained in the ring, so dispatch order defines observation order for every
//!   matching subscriber.
//! - **Lag handling**: receivers that fall behind more than the ring capacity
//!   observe `Lagged(n)`, skip `n` oldest items, and a warning is logged.
//! - **No persistence**: actions are lost if there are no active subscriptions at send time.

use tokio::sync::broadcast;
use tracing::warn;

use super::action::Action;
use super::pattern::Pattern;

/// Broadcast channel for dispatched actions.
///
/// Thin wrapper over [`tokio::sync::broadcast`] that provides a
/// `dispatch`/`subscribe` API with pattern-filtered subscriptions.
///
/// ### Properties
/// - **Non-blocking**: `dispatch()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct ActionBus {
    tx: broadcast::Sender<Action>,
}

impl ActionBus {
    /// Creates a new bus with the given ring capacity.
    ///
    /// ### Notes
    /// - Capacity is **shared** across all receivers (not per-subscription).
    /// - The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Action>(capacity);
        Self { tx }
    }

    /// Dispatches one action to all active subscriptions.
    ///
    /// If there are no receivers, the action is dropped (this function still
    /// returns immediately).
    pub fn dispatch(&self, action: Action) {
        let _ = self.tx.send(action);
    }

    /// Dispatches a batch of actions in order. An empty batch is a no-op.
    pub fn dispatch_all(&self, actions: Vec<Action>) {
        for action in actions {
            self.dispatch(action);
        }
    }

    /// Creates a pattern-filtered subscription.
    ///
    /// - Each call creates an **independent** receiver.
    /// - A subscription only observes actions **dispatched after** it is created.
    /// - Two actions dispatched in sequence are observed in that order by
    ///   every subscription whose pattern matches both.
    pub fn subscribe(&self, pattern: Pattern) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            pattern,
        }
    }

    /// Number of active receivers (diagnostic).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A pattern-filtered view onto the action bus.
///
/// Wraps a broadcast receiver; non-matching actions are skipped silently,
/// lagged items are skipped with a warning.
pub struct Subscription {
    rx: broadcast::Receiver<Action>,
    pattern: Pattern,
}

impl Subscription {
    /// Waits for the next matching action.
    ///
    /// Returns `None` once the bus is closed (all senders dropped).
    pub async fn next(&mut self) -> Option<Action> {
        loop {
            match self.rx.recv().await {
                Ok(action) if self.pattern.matches(&action) => return Some(action),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "action subscription lagged; skipping oldest");
                    continue;
                }
            }
        }
    }

    /// Discards every action currently buffered for this subscription.
    ///
    /// Used by the leading-wins strategy to drop actions that arrived while
    /// a handler was running.
    pub fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}
