//! Blocking coordination primitives built on a single monitor discipline.
//!
//! This crate provides:
//! - [`NonReentrantLock`]: binary lock, blocking acquire, single-waiter wakeup
//! - [`BoundedBlockingQueue`]: fixed-capacity FIFO with blocking producers and consumers
//! - [`MemoCache`]: key-addressed cache computing each value at most once
//! - [`SequentialBarrier`]: runs one action per stage, strictly in stage order
//!
//! Every primitive owns exactly one internal monitor (a mutex paired with
//! condition variables) and never locks another instance. All waits re-check
//! their predicate after each wakeup, and each blocking call has a `*_with`
//! variant taking a [`WaitConfig`] with an optional deadline and
//! [`CancellationToken`]. An abandoned wait leaves the primitive as if the
//! call had never been made.
//!
//! # Examples
//!
//! ```rust
//! use foundation_sync::{BoundedBlockingQueue, WaitConfig};
//! use std::time::Duration;
//!
//! let queue = BoundedBlockingQueue::new(1).unwrap();
//! queue.enqueue("job");
//!
//! let wait = WaitConfig::new().timeout(Duration::from_millis(10));
//! let rejected = queue.enqueue_with("overflow", &wait).unwrap_err();
//!
//! assert!(rejected.reason().is_timeout());
//! assert_eq!(rejected.into_inner(), "overflow");
//! assert_eq!(queue.dequeue(), "job");
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod monitor;

pub mod barrier;
pub mod cache;
pub mod errors;
pub mod lock;
pub mod queue;
pub mod wait;

pub use barrier::SequentialBarrier;
pub use cache::{CacheConfig, CacheStats, MemoCache};
pub use errors::{BoxedError, ComputeError, EnqueueError, SyncError, SyncResult};
pub use lock::{LockGuard, NonReentrantLock};
pub use queue::BoundedBlockingQueue;
pub use wait::{CancellationToken, WaitConfig};
