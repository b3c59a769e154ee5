//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the thunk runtime.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Thunks::new(bus, config)`
//! 2. **Supervisor defaults**: poll interval and retry backoff inherited by strategies
//!
//! ## Sentinel values
//! - `supervisor_retries = 0` → a failed supervisor loop is never resumed
//! - `bus_capacity` is clamped to a minimum of 1 by the bus

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Global configuration for the thunk runtime.
///
/// Defines:
/// - **Shutdown behavior**: grace period for graceful termination
/// - **Action bus**: ring buffer capacity for dispatch delivery
/// - **Supervisor resilience**: retry ceiling and backoff between resumes
/// - **Poll defaults**: interval used by `Strategy::Poll` when none is given
///
/// ## Field semantics
/// - `grace`: maximum wait for supervisor/resource tasks to stop on shutdown
/// - `bus_capacity`: action bus ring buffer size (min 1; clamped by the bus)
/// - `poll_interval`: default sleep between poll-strategy iterations
/// - `supervisor_retries`: attempts to resume a crashed supervisor loop (`0` = give up immediately)
/// - `supervisor_backoff`: delay growth between supervisor resumes
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for graceful shutdown before giving up.
    ///
    /// When `shutdown()` is called:
    /// - Supervisor and resource tasks are cancelled via `CancellationToken`
    /// - The runtime waits up to `grace` for them to exit
    /// - If the timeout is exceeded, returns `ConfigError::GraceExceeded`
    pub grace: Duration,

    /// Capacity of the action bus broadcast ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` actions will
    /// observe `Lagged` and skip older items. Minimum value is 1 (enforced by the bus).
    pub bus_capacity: usize,

    /// Default interval between poll-strategy iterations.
    ///
    /// A per-dispatch override may be supplied in the triggering action's
    /// payload under the `"interval"` field (milliseconds).
    pub poll_interval: Duration,

    /// How many times a crashed supervisor loop is resumed before it ends permanently.
    pub supervisor_retries: u32,

    /// Backoff policy between supervisor loop resumes.
    pub supervisor_backoff: BackoffPolicy,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    ///
    /// The bus should use this value to avoid constructing an invalid channel.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 30s` (reasonable graceful shutdown window)
    /// - `bus_capacity = 1024` (good baseline)
    /// - `poll_interval = 10s`
    /// - `supervisor_retries = 3`
    /// - `supervisor_backoff = BackoffPolicy::default()` (constant 100ms, capped)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            poll_interval: Duration::from_secs(10),
            supervisor_retries: 3,
            supervisor_backoff: BackoffPolicy::default(),
        }
    }
}
