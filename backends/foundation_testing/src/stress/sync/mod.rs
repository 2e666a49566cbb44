//! Stress drivers, one per primitive.
//!
//! Each driver shares a single primitive between all workers and reports a
//! round as failed as soon as it observes a broken guarantee.

pub mod barrier;
pub mod cache;
pub mod lock;
pub mod queue;

pub use barrier::run_barrier_ordering_stress;
pub use cache::run_cache_memoization_stress;
pub use lock::run_lock_exclusion_stress;
pub use queue::run_queue_handoff_stress;
