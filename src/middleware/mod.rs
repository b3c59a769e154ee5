//! Middleware: per-invocation context and onion composition.
//!
//! ## Contents
//! - [`Ctx`] per-invocation mutable record (action, name, key, payload, result)
//! - [`Middleware`], [`MiddlewareFn`] the stage trait and its function-backed impl
//! - [`compose`], [`Pipeline`], [`Next`] index-tracked onion execution
//!
//! ## Quick wiring
//! ```text
//! Thunks::create(name, stages)
//!      └─► compose(stages) ─► Pipeline
//!           └─► Supervisor strategy invokes Pipeline::run(Ctx, dynamic_tail)
//! ```

mod compose;
mod context;

pub use compose::{compose, DynMiddleware, Middleware, MiddlewareFn, Next, Pipeline};
pub use context::Ctx;
