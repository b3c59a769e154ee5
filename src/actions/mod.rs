//! Actions: data model, pattern matching, and the dispatch bus.
//!
//! This module groups the action **data model** and the **bus** used to
//! dispatch/observe actions flowing through the runtime.
//!
//! ## Contents
//! - [`Action`] immutable event record with payload/meta/error metadata
//! - [`Pattern`] boolean test over actions (wildcard, kind, OR, predicate)
//! - [`ActionBus`], [`Subscription`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Dispatchers**: callers (`dispatch`), supervisors (diagnostics), the
//!   store's update pipeline (`store/updated`).
//! - **Consumers**: supervisor strategy loops (one subscription per thunk),
//!   devtools/observability taps.

mod action;
mod bus;
mod pattern;

pub use action::{
    Action, CLEAR_THROTTLE_KIND, ERROR_KIND, STORE_UPDATED_KIND, SUPERVISOR_RETRY_KIND,
};
pub use bus::{ActionBus, Subscription};
pub use pattern::Pattern;
