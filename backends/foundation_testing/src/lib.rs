//! Stress testing infrastructure for the `foundation_sync` primitives.
//!
//! This crate provides:
//! - **Stress harness**: runs an operation from many threads for many rounds
//! - **Primitive drivers**: one contention scenario per primitive, each
//!   checking that primitive's guarantee on every round
//! - **Criterion benchmarks**: uncontended and contended costs
//!
//! # Examples
//!
//! ```rust
//! use foundation_testing::stress::{StressConfig, StressHarness};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let config = StressConfig::new()
//!     .workers(10)
//!     .rounds(1000);
//!
//! let counter = AtomicUsize::new(0);
//! let results = StressHarness::new(config).run(|_worker, _round| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//!     true
//! });
//!
//! assert_eq!(results.successes, 10000); // 10 threads * 1000 rounds
//! assert!(results.is_clean());
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod stress;

pub use stress::{StressConfig, StressHarness, StressResult};
