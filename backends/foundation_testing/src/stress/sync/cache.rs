//! `MemoCache` stress driver.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::{MemoCache, SyncError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Has every worker request the same small key space concurrently.
///
/// Round `r` requests key `r % cache_keys`; the supplier sleeps for
/// [`StressConfig::get_compute_delay`] to widen the race window and honours
/// the run-wide token. A round fails if it receives a wrong value, if its
/// wait gave up, or if the supplier for its key has run more than once.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_cache_memoization_stress};
///
/// let config = StressConfig::new().workers(8).rounds(50).cache_keys(5);
/// assert!(run_cache_memoization_stress(&config).is_clean());
/// ```
#[must_use]
pub fn run_cache_memoization_stress(config: &StressConfig) -> StressResult {
    let keys = config.get_cache_keys();
    let cache: MemoCache<usize, usize> = MemoCache::new();
    let invocations: Vec<AtomicUsize> = (0..keys).map(|_| AtomicUsize::new(0)).collect();

    let result = StressHarness::new(config.clone()).run(|worker, round| {
        let key = round % keys;
        let supplier = || -> Result<usize, SyncError> {
            invocations[key].fetch_add(1, Ordering::SeqCst);
            thread::sleep(config.get_compute_delay());
            if let Some(token) = config.get_token() {
                token.checkpoint()?;
            }
            Ok(key * 10)
        };

        match cache.get_or_compute_with(key, supplier, &config.round_wait()) {
            Ok(value) => value == key * 10 && invocations[key].load(Ordering::SeqCst) == 1,
            Err(reason) => {
                tracing::warn!(worker, round, %reason, "cache request failed");
                false
            }
        }
    });

    let stats = cache.stats();
    tracing::debug!(
        hits = stats.hits,
        misses = stats.misses,
        ratio = stats.ratio(),
        "cache stress finished"
    );
    result
}
