//! `BoundedBlockingQueue` stress driver.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::BoundedBlockingQueue;
use std::collections::HashSet;
use std::sync::Mutex;

/// Runs a producer/consumer handoff through one bounded queue of
/// [`StressConfig::get_queue_capacity`] slots.
///
/// Even workers enqueue unique items, odd workers dequeue them. A round
/// fails if it blocks longer than the configured patience, if the queue is
/// ever seen above capacity, or if a consumer receives an item twice. Use
/// an even worker count and no time limit so producers and consumers
/// balance.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_queue_handoff_stress};
///
/// let config = StressConfig::new().workers(4).rounds(250).queue_capacity(3);
/// assert!(run_queue_handoff_stress(&config).is_clean());
/// ```
///
/// # Panics
///
/// Panics only if the queue rejects the configured capacity, which
/// [`StressConfig`] keeps at one or more.
#[must_use]
pub fn run_queue_handoff_stress(config: &StressConfig) -> StressResult {
    let queue =
        BoundedBlockingQueue::new(config.get_queue_capacity()).expect("capacity is never zero");
    let seen = Mutex::new(HashSet::new());

    StressHarness::new(config.clone()).run(|worker, round| {
        let wait = config.round_wait();

        if worker % 2 == 0 {
            match queue.enqueue_with((worker, round), &wait) {
                Ok(()) => queue.len() <= queue.capacity(),
                Err(err) => {
                    tracing::warn!(worker, round, reason = %err.reason(), "producer stalled");
                    false
                }
            }
        } else {
            match queue.dequeue_with(&wait) {
                Ok(item) => {
                    let mut seen = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    seen.insert(item)
                }
                Err(reason) => {
                    tracing::warn!(worker, round, %reason, "consumer stalled");
                    false
                }
            }
        }
    })
}
