//! `NonReentrantLock` stress driver.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::NonReentrantLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Hammers one lock from every worker.
///
/// Each round acquires the lock within the configured patience, performs a
/// non-atomic increment and decrement of a shared counter and releases it.
/// A round fails if the acquire gave up, if another worker was observed
/// inside the critical section or if the counter was not exactly one after
/// the increment.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_lock_exclusion_stress};
///
/// let result = run_lock_exclusion_stress(&StressConfig::new().workers(4).rounds(200));
/// assert!(result.is_clean());
/// ```
#[must_use]
pub fn run_lock_exclusion_stress(config: &StressConfig) -> StressResult {
    let lock = NonReentrantLock::new();
    let inside = AtomicBool::new(false);
    let counter = AtomicI64::new(0);

    StressHarness::new(config.clone()).run(|worker, round| {
        let _guard = match lock.guard_with(&config.round_wait()) {
            Ok(guard) => guard,
            Err(reason) => {
                tracing::warn!(worker, round, %reason, "lock acquire gave up");
                return false;
            }
        };

        let overlapped = inside.swap(true, Ordering::Relaxed);

        // split load/store so a missing exclusion loses updates
        let value = counter.load(Ordering::Relaxed) + 1;
        counter.store(value, Ordering::Relaxed);
        let balanced = counter.load(Ordering::Relaxed) == 1;
        counter.store(counter.load(Ordering::Relaxed) - 1, Ordering::Relaxed);

        inside.store(false, Ordering::Relaxed);
        !overlapped && balanced
    })
}
