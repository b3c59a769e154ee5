//! Thunks: declarations, supervision, and managed resources.
//!
//! ## Contents
//! - [`Thunks`], [`ThunkOptions`] the registry and lifecycle surface
//! - [`ActionCreator`] caller-facing handle for one declared thunk
//! - [`Strategy`] concurrency policies applied by per-thunk supervisors
//! - [`Resource`], [`ResourceFn`], [`ResourceHandle`], [`ResourceSlot`]
//!   long-lived managed values
//!
//! ## Quick wiring
//! ```text
//! Thunks::new(bus, config)
//!      ├─ create(name, stages) ──► ActionCreator (dispatch or run directly)
//!      ├─ manage(name, res)    ──► ResourceHandle (get / expect)
//!      ├─ register(&store)     ──► supervisor + resource tasks start
//!      └─ shutdown()           ──► cancel, wait for grace
//! ```

mod api;
mod creator;
mod resource;
mod supervisor;

pub use api::{ThunkOptions, Thunks};
pub use creator::ActionCreator;
pub use resource::{Resource, ResourceFn, ResourceHandle, ResourceRef, ResourceSlot};
pub use supervisor::Strategy;
