//! `SequentialBarrier` stress driver.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::SequentialBarrier;
use std::sync::Mutex;

/// Runs one barrier per round with one stage per worker.
///
/// Worker `w` owns stage `workers - 1 - w`, so the highest stage is usually
/// the first to arrive. A round fails if the worker's action ran out of
/// stage order or if the worker waited longer than the configured patience.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_barrier_ordering_stress};
///
/// let result = run_barrier_ordering_stress(&StressConfig::new().workers(4).rounds(50));
/// assert!(result.is_clean());
/// ```
#[must_use]
pub fn run_barrier_ordering_stress(config: &StressConfig) -> StressResult {
    let stages = config.get_workers();
    let rounds: Vec<_> = (0..config.get_rounds())
        .filter_map(|_| SequentialBarrier::new(stages).ok())
        .map(|barrier| (barrier, Mutex::new(Vec::with_capacity(stages))))
        .collect();

    StressHarness::new(config.clone()).run(|worker, round| {
        let Some((barrier, order)) = rounds.get(round) else {
            return false;
        };
        let stage = stages - 1 - worker;

        let in_order = barrier.arrive_and_wait_with(
            stage,
            || {
                let mut order = order.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let position = order.len();
                order.push(stage);
                position == stage
            },
            &config.round_wait(),
        );

        match in_order {
            Ok(in_order) => in_order,
            Err(reason) => {
                tracing::warn!(worker, round, %reason, "stage arrival failed");
                false
            }
        }
    })
}
