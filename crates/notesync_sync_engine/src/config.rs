//! Configuration for the sync engine.

use notesync_protocol::ConflictPolicy;
use rand::Rng;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Owner of the remote document.
    pub principal: String,
    /// Policy applied when local and remote versions diverge.
    pub conflict_policy: ConflictPolicy,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Maximum number of attachment transfers in flight.
    pub max_concurrent_transfers: usize,
    /// Quiet period after a local mutation before a cycle starts.
    pub debounce: Duration,
    /// Deadline for every remote call.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            conflict_policy: ConflictPolicy::default(),
            retry: RetryConfig::default(),
            max_concurrent_transfers: 4,
            debounce: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the attachment transfer concurrency (at least 1).
    pub fn with_max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = limit.max(1);
        self
    }

    /// Sets the local mutation debounce.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the remote call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Backoff policy for failed cycles.
///
/// Bounds both [`SyncEngine::sync_with_retry`](crate::SyncEngine::sync_with_retry)
/// and the run loop, which re-drives a failed cycle for as long as the
/// highest pending retry count stays under `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per failure streak, counting the first.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
    /// Growth factor between consecutive waits.
    pub backoff_multiplier: f64,
    /// Adds up to 25% of random slack to every wait.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// `max_attempts` attempts, 100 ms doubling up to 30 s, with jitter.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A single attempt; failures wait for the next trigger.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Wait before attempt number `failed + 1`, or `None` once `failed`
    /// attempts exhaust the budget. Zero failures never schedule anything.
    pub fn backoff(&self, failed: u32) -> Option<Duration> {
        (failed > 0 && failed < self.max_attempts).then(|| self.delay_for_attempt(failed))
    }

    /// Wait after `attempt` failed attempts. `attempt == 0` is immediate.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        let slack = if self.add_jitter {
            secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0)
        } else {
            0.0
        };
        Duration::from_secs_f64(secs + slack)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
