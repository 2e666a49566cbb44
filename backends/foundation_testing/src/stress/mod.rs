//! Stress harness for the blocking primitives.
//!
//! A run spawns [`StressConfig::get_workers`] scoped workers, each
//! executing the operation for its configured number of rounds, and tallies
//! the rounds that upheld the property under test. Workers stop early once
//! the time limit passes or the run-wide cancellation token fires.

use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use serde::Serialize;

pub mod config;
pub mod sync;

pub use config::StressConfig;

/// Tally of a finished stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressResult {
    /// Rounds whose operation reported success
    pub successes: usize,
    /// Rounds whose operation reported a violation
    pub failures: usize,
    /// Wall-clock time of the run
    pub duration: Duration,
    /// Number of workers used
    pub thread_count: usize,
}

impl StressResult {
    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.successes + self.failures
    }

    /// Fraction of rounds that succeeded, between 0.0 and 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        match self.total_operations() {
            0 => 0.0,
            total => self.successes as f64 / total as f64,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn operations_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.total_operations() as f64 / secs
        }
    }

    /// `true` when every executed round succeeded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failures == 0
    }

    /// Renders the result as JSON for CI logs.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the result cannot be encoded.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Runs an operation concurrently from many workers.
pub struct StressHarness {
    config: StressConfig,
}

impl StressHarness {
    #[must_use]
    pub const fn new(config: StressConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Runs `operation(worker, round)` on every worker for every round.
    ///
    /// The operation returns `true` when the round upheld the property being
    /// tested. A panicking round is counted as a failure and ends that
    /// worker; the other workers keep going.
    ///
    /// # Examples
    ///
    /// ```
    /// use foundation_testing::stress::{StressConfig, StressHarness};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let counter = AtomicUsize::new(0);
    /// let harness = StressHarness::new(StressConfig::new().workers(4).rounds(100));
    ///
    /// let result = harness.run(|_worker, _round| {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    ///     true
    /// });
    ///
    /// assert_eq!(counter.load(Ordering::Relaxed), 400);
    /// assert_eq!(result.successes, 400);
    /// ```
    pub fn run<F>(&self, operation: F) -> StressResult
    where
        F: Fn(usize, usize) -> bool + Sync,
    {
        let started = Instant::now();
        let deadline = self
            .config
            .get_time_limit()
            .and_then(|limit| started.checked_add(limit));

        let successes = AtomicUsize::new(0);
        let failures = AtomicUsize::new(0);

        thread::scope(|scope| {
            let workers: Vec<_> = (0..self.config.get_workers())
                .map(|worker| {
                    let operation = &operation;
                    let successes = &successes;
                    let failures = &failures;
                    scope.spawn(move || {
                        for round in 0..self.config.get_rounds() {
                            if deadline.is_some_and(|d| Instant::now() >= d)
                                || self.config.is_cancelled()
                            {
                                break;
                            }
                            if operation(worker, round) {
                                successes.fetch_add(1, Ordering::Relaxed);
                            } else {
                                failures.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    })
                })
                .collect();

            for (worker, handle) in workers.into_iter().enumerate() {
                if handle.join().is_err() {
                    tracing::error!(worker, "stress worker panicked");
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        let result = StressResult {
            successes: successes.load(Ordering::Relaxed),
            failures: failures.load(Ordering::Relaxed),
            duration: started.elapsed(),
            thread_count: self.config.get_workers(),
        };
        tracing::debug!(
            successes = result.successes,
            failures = result.failures,
            "stress run finished"
        );
        result
    }
}
