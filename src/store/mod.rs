//! State store: immutable snapshots, explicit drafts, serialized commits.
//!
//! ## Contents
//! - [`Store`] snapshot holder and the transactional update pipeline
//! - [`Draft`], [`Patch`], [`PatchOp`] explicit copy-on-write mutation builder
//! - [`Schema`], [`SliceSchema`] named slices composed into one snapshot
//! - [`Mutator`], [`UpdaterCtx`] the update-call surface
//!
//! ## Quick wiring
//! ```text
//! Store::new(bus, schemas)           shallow-merges each schema's subtree
//!      │
//!      ├─ update(mutators) ─► Draft ─► commit ─► hooks ─► "store/updated"
//!      │                                        ─► watch bump ─► raw listeners
//!      └─ select(f)        ─► pure read of the current snapshot
//! ```

mod patch;
mod schema;
mod state;

pub use patch::{Draft, Patch, PatchOp};
pub use schema::{Schema, SliceSchema, UpdateHook};
pub use state::{mutator, ListenerGuard, Mutator, RawListener, Store, UpdaterCtx};
