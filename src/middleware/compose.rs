//! # Middleware composition: the onion pipeline.
//!
//! [`compose`] turns an ordered list of middleware into one [`Pipeline`].
//! Execution is index-tracked: stage *i* must call its [`Next`] before stage
//! *i+1* proceeds, and code after `next.run(ctx).await` returns runs after all
//! downstream stages finish — natural before/after semantics.
//!
//! ## Rules
//! - A stage that never calls `next` skips every remaining stage **including
//!   the optional tail** — the sanctioned short-circuit for cache hits and
//!   validation failures.
//! - Calling `next` a second time within one stage is a programming error and
//!   fails loudly with [`ThunkError::NextCalledTwice`]; it is never swallowed.
//! - The context is owned by the chain: each stage receives it, and either
//!   returns it directly (short-circuit) or passes it through `next`.
//!
//! ## Example
//! ```rust
//! use thunkvisor::{compose, Action, Ctx, MiddlewareFn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pipeline = compose(vec![
//!     MiddlewareFn::arc(|mut ctx: Ctx, next| async move {
//!         ctx.set_ext("before", serde_json::json!(true));
//!         let ctx = next.run(ctx).await?; // downstream stages run here
//!         Ok(ctx)
//!     }),
//! ]);
//!
//! let ctx = pipeline
//!     .run(Ctx::from_action(Action::new("demo")), None)
//!     .await
//!     .unwrap();
//! assert_eq!(ctx.ext("before"), Some(&serde_json::json!(true)));
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ThunkError;

use super::context::Ctx;

/// Shared handle to a middleware stage.
pub type DynMiddleware = Arc<dyn Middleware>;

/// # One stage of the onion pipeline.
///
/// A stage receives the owned [`Ctx`] and a [`Next`] continuation. It may:
/// - run code, call `next.run(ctx).await`, then run code again (before/after);
/// - return without calling `next` to short-circuit downstream stages;
/// - return an error to abandon the pipeline from this stage down.
pub trait Middleware: Send + Sync + 'static {
    /// Executes this stage.
    fn handle(&self, ctx: Ctx, next: Next) -> BoxFuture<'static, Result<Ctx, ThunkError>>;
}

/// Function-backed middleware stage.
///
/// Wraps a closure that *creates* a new future per invocation, the same
/// shape used for function-backed resources.
pub struct MiddlewareFn<F> {
    f: F,
}

impl<F> MiddlewareFn<F> {
    /// Creates a new function-backed stage.
    ///
    /// Prefer [`MiddlewareFn::arc`] when you immediately need a [`DynMiddleware`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the stage and returns it as a shared handle.
    pub fn arc<Fut>(f: F) -> DynMiddleware
    where
        F: Fn(Ctx, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Ctx, ThunkError>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

impl<F, Fut> Middleware for MiddlewareFn<F>
where
    F: Fn(Ctx, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Ctx, ThunkError>> + Send + 'static,
{
    fn handle(&self, ctx: Ctx, next: Next) -> BoxFuture<'static, Result<Ctx, ThunkError>> {
        Box::pin((self.f)(ctx, next))
    }
}

/// Continuation handed to each stage.
///
/// Cloneable so a misbehaving stage *can* call it twice — the shared
/// watermark turns that into [`ThunkError::NextCalledTwice`] instead of
/// silently re-running downstream stages.
#[derive(Clone)]
pub struct Next {
    stages: Arc<[DynMiddleware]>,
    tail: Option<DynMiddleware>,
    index: usize,
    watermark: Arc<AtomicUsize>,
}

impl Next {
    /// Runs the remaining stages (and the tail, if any) against `ctx`.
    pub fn run(&self, ctx: Ctx) -> BoxFuture<'static, Result<Ctx, ThunkError>> {
        let index = self.index;

        // Watermark records the deepest dispatched stage. If it already moved
        // past this depth, this stage's next() was invoked before.
        let previous = self.watermark.fetch_max(index + 1, AtomicOrdering::SeqCst);
        if previous > index {
            return Box::pin(async move {
                Err(ThunkError::NextCalledTwice {
                    index: index.saturating_sub(1),
                })
            });
        }

        let deeper = Next {
            stages: Arc::clone(&self.stages),
            tail: self.tail.clone(),
            index: index + 1,
            watermark: Arc::clone(&self.watermark),
        };

        if let Some(stage) = self.stages.get(index) {
            stage.handle(ctx, deeper)
        } else if index == self.stages.len() {
            match &self.tail {
                Some(tail) => tail.handle(ctx, deeper),
                None => Box::pin(async move { Ok(ctx) }),
            }
        } else {
            Box::pin(async move { Ok(ctx) })
        }
    }
}

/// Ordered list of middleware, executable as one unit.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[DynMiddleware]>,
}

impl Pipeline {
    /// Number of stages (excluding any tail supplied at run time).
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the pipeline to completion.
    ///
    /// `tail` is an optional stage appended after the explicit list; it is
    /// skipped like any other downstream stage when an earlier stage
    /// short-circuits.
    pub async fn run(&self, ctx: Ctx, tail: Option<DynMiddleware>) -> Result<Ctx, ThunkError> {
        let next = Next {
            stages: Arc::clone(&self.stages),
            tail,
            index: 0,
            watermark: Arc::new(AtomicUsize::new(0)),
        };
        next.run(ctx).await
    }
}

/// Composes an ordered middleware list into one [`Pipeline`].
pub fn compose(stages: Vec<DynMiddleware>) -> Pipeline {
    Pipeline {
        stages: stages.into(),
    }
}
