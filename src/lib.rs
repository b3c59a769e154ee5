//! # thunkvisor
//!
//! **Thunkvisor** is an action-driven async runtime for Rust.
//!
//! It provides primitives to declare async handlers ("thunks") behind a
//! composable middleware pipeline, dispatch actions onto a bus, supervise
//! handler instances with per-thunk concurrency strategies, and keep
//! application state in a transactional snapshot store. The crate is
//! designed as a building block for long-lived interactive services.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ActionCreator │   │ActionCreator │   │ActionCreator │
//!     │ (thunk #1)   │   │ (thunk #2)   │   │ (thunk #3)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ dispatch         ▼ dispatch         ▼ dispatch
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                   ActionBus (broadcast channel)                   │
//! │                 (capacity: Config::bus_capacity)                  │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐  Store
//!     │  Supervisor  │   │  Supervisor  │   │  Supervisor  │  (update
//!     │   (Every)    │   │   (Latest)   │   │  (Throttle)  │  pipeline,
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘  "store/
//!      │ spawns           │ halts prior,     │ suppresses      updated")
//!      │ every instance   │ spawns newest    │ within window
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Middleware pipeline per instance (onion, single-call next)       │
//! │  instance-wide stages ─► thunk stages ─► dynamic override (tail)  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Thunks::new(bus, config)
//!   ├─► create(name, stages)      declare a thunk, get an ActionCreator
//!   ├─► manage(name, resource)    hand over a long-lived resource
//!   ├─► register(&store)          supervisors subscribe, resources start
//!   │
//!   │   loop per supervisor {
//!   │     ├─► observe matching action (dispatch order = observation order)
//!   │     ├─► apply strategy (Every / Latest / Leading / Poll / Throttle)
//!   │     ├─► run pipeline; failure ─► "thunk/error" diagnostic action
//!   │     └─► loop crash ─► resume with backoff, "supervisor/retry"
//!   │   }
//!   │
//!   └─► shutdown()                cancel all, wait Config::grace
//! ```
//!
//! ## Quick start
//! ```rust
//! use serde_json::json;
//! use thunkvisor::{
//!     ActionBus, Config, Ctx, MiddlewareFn, SliceSchema, Store, Thunks,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), thunkvisor::ConfigError> {
//!     let bus = ActionBus::new(Config::default().bus_capacity_clamped());
//!     let store = Store::new(bus.clone(), vec![
//!         SliceSchema::new("todos", json!({ "items": [] })).arc(),
//!     ])?;
//!     let thunks = Thunks::new(bus.clone(), Config::default());
//!
//!     let add = thunks.create("todos/add", vec![
//!         MiddlewareFn::arc(|mut ctx: Ctx, next| async move {
//!             ctx.result = Some(json!("added"));
//!             next.run(ctx).await
//!         }),
//!     ]);
//!
//!     thunks.register(&store);
//!     thunks.dispatch(add.action_with(json!({ "title": "write docs" })));
//!
//!     thunks.shutdown().await
//! }
//! ```
//!
//! ## Modules
//! - [`actions`](crate::Action): actions, patterns, and the broadcast bus
//! - [`middleware`](crate::Middleware): context and onion composition
//! - [`thunks`](crate::Thunks): registry, strategies, managed resources
//! - [`store`](crate::Store): snapshots, drafts, and the update pipeline
//! - [`policies`](crate::BackoffPolicy): supervisor resume backoff and jitter

mod actions;
mod config;
mod error;
mod key;
mod middleware;
mod policies;
mod store;
mod thunks;

pub use actions::{
    Action, ActionBus, Pattern, Subscription, CLEAR_THROTTLE_KIND, ERROR_KIND,
    STORE_UPDATED_KIND, SUPERVISOR_RETRY_KIND,
};
pub use config::Config;
pub use error::{ConfigError, ThunkError};
pub use key::derive_key;
pub use middleware::{compose, Ctx, DynMiddleware, Middleware, MiddlewareFn, Next, Pipeline};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use store::{
    mutator, Draft, ListenerGuard, Mutator, Patch, PatchOp, RawListener, Schema, SliceSchema,
    Store, UpdateHook, UpdaterCtx,
};
pub use thunks::{
    ActionCreator, Resource, ResourceFn, ResourceHandle, ResourceRef, ResourceSlot, Strategy,
    ThunkOptions, Thunks,
};
