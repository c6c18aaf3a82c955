//! # Runtime configuration.
//!
//! [`Config`] carries the node-wide knobs: child stop deadline, the lifespan used
//! when an application declares none, channel capacities, and how a controller
//! retries a graceful stop that left children running.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use actor_supervisor::runtime::Config;
//!
//! let mut cfg = Config::default();
//! cfg.stop_timeout = Duration::from_secs(1);
//! cfg.shutdown_retry.max_attempts = 5;
//!
//! assert_eq!(cfg.shutdown_retry.max_attempts, 5);
//! ```

use std::time::Duration;

/// One hundred years. Long enough that a timer armed with it never fires.
pub const DEFAULT_LIFESPAN: Duration = Duration::from_secs(31_536_000 * 100);

/// How a controller retries a graceful stop that left children running.
///
/// After `max_attempts` incomplete attempts the remaining children are killed.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 100ms initial backoff, capped at 2s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Global configuration for a node and everything running on it.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long a supervisor waits for each child to confirm its exit.
    pub stop_timeout: Duration,
    /// Lifespan substituted when an application declares zero.
    pub default_lifespan: Duration,
    /// Capacity of each process's direct request channel.
    pub direct_capacity: usize,
    /// Default timeout for synchronous calls.
    pub call_timeout: Duration,
    /// Retry policy for incomplete graceful stops.
    pub shutdown_retry: RetryPolicy,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `stop_timeout = 5s`
    /// - `default_lifespan = 100 years`
    /// - `direct_capacity = 16`
    /// - `call_timeout = 5s`
    /// - `shutdown_retry = RetryPolicy::default()`
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            default_lifespan: DEFAULT_LIFESPAN,
            direct_capacity: 16,
            call_timeout: Duration::from_secs(5),
            shutdown_retry: RetryPolicy::default(),
        }
    }
}
