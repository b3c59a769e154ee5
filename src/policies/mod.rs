//! Supervisor resilience policies.
//!
//! This module groups the knobs that control **how long** to wait between
//! resumes of a crashed supervisor loop.
//!
//! ## Contents
//! - [`BackoffPolicy`] how resume delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization strategy to avoid synchronized resumes
//!
//! ## Quick wiring
//! ```text
//! Config { supervisor_backoff: BackoffPolicy, supervisor_retries: u32 }
//!      └─► thunks::supervisor::run_with_retry uses backoff.next(attempt)
//!          to schedule each resume of a failed strategy loop
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
