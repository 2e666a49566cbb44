//! Stress run configuration.
//!
//! Besides the run shape (workers, rounds, wall-clock limit), the config
//! carries the knobs the primitive drivers vary: how long a single blocking
//! call may wait, an optional run-wide [`CancellationToken`], the queue
//! capacity, the size of the cache key space and the cost of a cache
//! supplier.

use core::num::NonZeroUsize;
use core::time::Duration;

use foundation_sync::{CancellationToken, WaitConfig};

const DEFAULT_PATIENCE: Duration = Duration::from_secs(5);
const DEFAULT_COMPUTE_DELAY: Duration = Duration::from_micros(200);

/// Shape and contention knobs of a stress run.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::StressConfig;
/// use std::time::Duration;
///
/// let config = StressConfig::new()
///     .workers(6)
///     .rounds(500)
///     .queue_capacity(1)
///     .patience(Duration::from_secs(2));
///
/// assert_eq!(config.planned_rounds(), 3000);
/// assert!(config.round_wait().get_deadline().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct StressConfig {
    workers: NonZeroUsize,
    rounds: usize,
    time_limit: Option<Duration>,
    /// Longest a single blocking call may wait before the round fails
    patience: Duration,
    /// Aborts pending waits and stops workers from starting new rounds
    token: Option<CancellationToken>,
    queue_capacity: NonZeroUsize,
    cache_keys: NonZeroUsize,
    /// Time a cache supplier sleeps to widen the single-flight race
    compute_delay: Duration,
}

impl StressConfig {
    /// 4 workers × 1000 rounds, 5s patience, queue capacity 4, 8 cache keys.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers: NonZeroUsize::MIN.saturating_add(3),
            rounds: 1000,
            time_limit: None,
            patience: DEFAULT_PATIENCE,
            token: None,
            queue_capacity: NonZeroUsize::MIN.saturating_add(3),
            cache_keys: NonZeroUsize::MIN.saturating_add(7),
            compute_delay: DEFAULT_COMPUTE_DELAY,
        }
    }

    /// Number of worker threads, raised to 1 if zero. The barrier driver
    /// uses one stage per worker.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN);
        self
    }

    #[must_use]
    pub fn rounds(mut self, count: usize) -> Self {
        self.rounds = count;
        self
    }

    /// Stops workers from starting new rounds once `limit` has elapsed.
    #[must_use]
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn patience(mut self, patience: Duration) -> Self {
        self.patience = patience;
        self
    }

    /// Shares `token` with every blocking call of the run.
    #[must_use]
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Capacity of the queue under test, raised to 1 if zero.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Number of distinct cache keys, raised to 1 if zero.
    #[must_use]
    pub fn cache_keys(mut self, keys: usize) -> Self {
        self.cache_keys = NonZeroUsize::new(keys).unwrap_or(NonZeroUsize::MIN);
        self
    }

    #[must_use]
    pub fn compute_delay(mut self, delay: Duration) -> Self {
        self.compute_delay = delay;
        self
    }

    #[must_use]
    pub const fn get_workers(&self) -> usize {
        self.workers.get()
    }

    #[must_use]
    pub const fn get_rounds(&self) -> usize {
        self.rounds
    }

    #[must_use]
    pub const fn get_time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    #[must_use]
    pub const fn get_token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    #[must_use]
    pub const fn get_queue_capacity(&self) -> usize {
        self.queue_capacity.get()
    }

    #[must_use]
    pub const fn get_cache_keys(&self) -> usize {
        self.cache_keys.get()
    }

    #[must_use]
    pub const fn get_compute_delay(&self) -> Duration {
        self.compute_delay
    }

    /// Wait policy for one blocking call, starting now.
    #[must_use]
    pub fn round_wait(&self) -> WaitConfig {
        let wait = WaitConfig::new().timeout(self.patience);
        match &self.token {
            Some(token) => wait.cancel_with(token.clone()),
            None => wait,
        }
    }

    /// Whether the run-wide token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Rounds performed when neither the time limit nor the token cuts
    /// the run short.
    #[must_use]
    pub const fn planned_rounds(&self) -> usize {
        self.workers.get() * self.rounds
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}
