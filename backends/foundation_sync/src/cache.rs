//! Memoizing cache with at-most-one computation per key.
//!
//! Every key moves through `absent -> Pending -> {Ready | Failed}`. The
//! first caller for an absent key inserts a `Pending` slot under the cache
//! lock (a miss) and runs the supplier outside of it; every later caller
//! either reads the `Ready` value or blocks until the computing caller
//! resolves the slot (a hit).
//!
//! Resolved outcomes are parked per computation ticket until each blocked
//! waiter has collected its copy. This is what lets a failure reach every
//! waiter even though the failed slot itself is removed from the map at
//! once, leaving the key free for a retry.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::Serialize;

use crate::errors::{BoxedError, ComputeError, SyncError, SyncResult};
use crate::monitor::{Condition, Interrupted, Monitor};
use crate::wait::WaitConfig;

const RESOLVED: Condition = Condition::new(0);

/// Configuration for a [`MemoCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheConfig {
    /// Maximum number of committed entries kept; `None` keeps everything
    max_entries: Option<NonZeroUsize>,
}

impl CacheConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self { max_entries: None }
    }

    /// Bounds the number of committed entries; the oldest commit is
    /// evicted first. Entries still being computed are never evicted.
    #[must_use]
    pub const fn max_entries(mut self, limit: NonZeroUsize) -> Self {
        self.max_entries = Some(limit);
        self
    }

    #[must_use]
    pub const fn get_max_entries(&self) -> Option<NonZeroUsize> {
        self.max_entries
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests served without creating a pending slot
    pub hits: u64,
    /// Requests that created a pending slot and ran the supplier
    pub misses: u64,
    /// Committed entries dropped to honour `max_entries`
    pub evictions: u64,
}

impl CacheStats {
    /// Returns `hits / (hits + misses)`, or `0.0` before any request.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Slot<V> {
    Pending { ticket: u64, waiters: usize },
    Ready(V),
}

/// Outcome of a finished computation kept for waiters that have not yet
/// woken up to collect it.
struct Parked<V> {
    outcome: Result<V, ComputeError>,
    waiters: usize,
}

struct CacheState<K, V> {
    slots: HashMap<K, Slot<V>>,
    parked: HashMap<u64, Parked<V>>,
    /// Commit order of `Ready` entries, oldest first.
    committed: VecDeque<K>,
    next_ticket: u64,
    stats: CacheStats,
    max_entries: Option<NonZeroUsize>,
}

enum Lookup<V> {
    Ready(V),
    Pending(u64),
    Absent,
}

impl<K: Eq + Hash + Clone, V: Clone> CacheState<K, V> {
    fn lookup(&mut self, key: &K) -> Lookup<V> {
        match self.slots.get_mut(key) {
            Some(Slot::Ready(value)) => Lookup::Ready(value.clone()),
            Some(Slot::Pending { ticket, waiters }) => {
                *waiters += 1;
                Lookup::Pending(*ticket)
            }
            None => Lookup::Absent,
        }
    }

    /// Collects the parked outcome for `ticket`, if the computation is done.
    fn collect(&mut self, ticket: u64) -> Option<SyncResult<V>> {
        let parked = self.parked.get_mut(&ticket)?;
        parked.waiters -= 1;

        let outcome = if parked.waiters == 0 {
            self.parked.remove(&ticket).map(|p| p.outcome)?
        } else {
            parked.outcome.clone()
        };

        Some(match outcome {
            Ok(value) => {
                self.stats.hits += 1;
                Ok(value)
            }
            Err(err) => Err(SyncError::Compute(err)),
        })
    }

    /// Withdraws a waiter that gave up before collecting its outcome.
    ///
    /// A waiter only gives up right after `collect` found nothing parked for
    /// its ticket, so the slot is still pending under that ticket.
    fn abandon(&mut self, key: &K, ticket: u64) {
        if let Some(Slot::Pending {
            ticket: current,
            waiters,
        }) = self.slots.get_mut(key)
        {
            if *current == ticket {
                *waiters -= 1;
            }
        }
    }

    /// Removes the pending slot for `ticket`, returning its waiter count.
    fn take_pending(&mut self, key: &K, ticket: u64) -> usize {
        match self.slots.remove(key) {
            Some(Slot::Pending {
                ticket: current,
                waiters,
            }) if current == ticket => waiters,
            Some(other) => {
                self.slots.insert(key.clone(), other);
                0
            }
            None => 0,
        }
    }

    fn commit(&mut self, key: &K, ticket: u64, value: &V) {
        let waiters = self.take_pending(key, ticket);
        if waiters > 0 {
            self.parked.insert(
                ticket,
                Parked {
                    outcome: Ok(value.clone()),
                    waiters,
                },
            );
        }

        self.slots.insert(key.clone(), Slot::Ready(value.clone()));
        self.committed.push_back(key.clone());
        self.evict_overflow();
    }

    fn fail(&mut self, key: &K, ticket: u64, error: &ComputeError) {
        let waiters = self.take_pending(key, ticket);
        if waiters > 0 {
            self.parked.insert(
                ticket,
                Parked {
                    outcome: Err(error.clone()),
                    waiters,
                },
            );
        }
    }

    fn evict_overflow(&mut self) {
        let Some(limit) = self.max_entries else {
            return;
        };

        while self.committed.len() > limit.get() {
            let Some(oldest) = self.committed.pop_front() else {
                break;
            };
            if let Some(Slot::Ready(_)) = self.slots.get(&oldest) {
                self.slots.remove(&oldest);
                self.stats.evictions += 1;
                tracing::trace!("evicted oldest committed cache entry");
            }
        }
    }

    fn invalidate(&mut self, key: &K) -> Option<V> {
        match self.slots.remove(key) {
            Some(Slot::Ready(value)) => {
                self.committed.retain(|k| k != key);
                Some(value)
            }
            Some(pending) => {
                self.slots.insert(key.clone(), pending);
                None
            }
            None => None,
        }
    }
}

/// A key-addressed cache that computes each value at most once.
///
/// Cloning produces another handle to the same cache.
///
/// # Examples
///
/// ```
/// use foundation_sync::MemoCache;
/// use std::convert::Infallible;
///
/// let cache: MemoCache<&str, u64> = MemoCache::new();
///
/// let first = cache.get_or_compute("answer", || Ok::<_, Infallible>(42)).unwrap();
/// let second = cache
///     .get_or_compute("answer", || -> Result<u64, Infallible> { unreachable!() })
///     .unwrap();
///
/// assert_eq!(first, second);
/// assert_eq!(cache.stats().misses, 1);
/// assert_eq!(cache.stats().hits, 1);
/// ```
pub struct MemoCache<K, V> {
    monitor: Arc<Monitor<CacheState<K, V>>>,
}

impl<K, V> Clone for MemoCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            monitor: Arc::clone(&self.monitor),
        }
    }
}

impl<K, V> core::fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("MemoCache")
            .field("slots", &state.slots.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self::with_config(CacheConfig::new())
    }
}

impl<K, V> MemoCache<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            monitor: Arc::new(Monitor::new(CacheState {
                slots: HashMap::new(),
                parked: HashMap::new(),
                committed: VecDeque::new(),
                next_ticket: 0,
                stats: CacheStats::default(),
                max_entries: config.get_max_entries(),
            })),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.monitor.lock().stats
    }

    /// Shorthand for `self.stats().ratio()`.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        self.stats().ratio()
    }

    /// Number of committed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitor.lock().committed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Returns the value for `key`, running `supplier` only if no other
    /// caller has computed or is computing it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Compute`] when the supplier fails, whether it
    /// ran on this thread or on the thread this call waited for.
    pub fn get_or_compute<F, E>(&self, key: K, supplier: F) -> SyncResult<V>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxedError>,
    {
        self.get_or_compute_with(key, supplier, &WaitConfig::new())
    }

    /// Like [`Self::get_or_compute`], bounding the time spent waiting for
    /// another caller's computation.
    ///
    /// The policy only applies while blocked on someone else; a caller
    /// that runs the supplier itself is not interrupted. Long suppliers can
    /// poll a [`CancellationToken`](crate::CancellationToken) checkpoint and
    /// fail with [`SyncError::Cancelled`], which is reported to this caller
    /// as `Cancelled` and to waiters as a compute failure.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] or [`SyncError::Cancelled`] when the
    /// wait gives up, or [`SyncError::Compute`] when the supplier fails.
    pub fn get_or_compute_with<F, E>(&self, key: K, supplier: F, wait: &WaitConfig) -> SyncResult<V>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxedError>,
    {
        let mut guard = self.monitor.lock();
        match guard.lookup(&key) {
            Lookup::Ready(value) => {
                guard.stats.hits += 1;
                Ok(value)
            }
            Lookup::Pending(ticket) => {
                tracing::trace!(ticket, "waiting on pending cache slot");
                match self
                    .monitor
                    .wait_for(guard, RESOLVED, wait, |state| state.collect(ticket))
                {
                    Ok((_, outcome)) => outcome,
                    Err(Interrupted { mut guard, reason }) => {
                        guard.abandon(&key, ticket);
                        Err(reason)
                    }
                }
            }
            Lookup::Absent => {
                let ticket = guard.next_ticket;
                guard.next_ticket += 1;
                guard.stats.misses += 1;
                guard.slots.insert(
                    key.clone(),
                    Slot::Pending {
                        ticket,
                        waiters: 0,
                    },
                );
                drop(guard);

                tracing::debug!(ticket, "cache miss, computing value");
                self.compute(key, ticket, supplier)
            }
        }
    }

    fn compute<F, E>(&self, key: K, ticket: u64, supplier: F) -> SyncResult<V>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxedError>,
    {
        let mut pending = PendingSlot {
            cache: self,
            key,
            ticket,
            armed: true,
        };

        let outcome = supplier().map_err(Into::into);
        pending.armed = false;

        let mut state = self.monitor.lock();
        let result = match outcome {
            Ok(value) => {
                state.commit(&pending.key, ticket, &value);
                Ok(value)
            }
            Err(cause) => {
                let cancelled = cause
                    .downcast_ref::<SyncError>()
                    .is_some_and(SyncError::is_cancelled);
                let error = ComputeError::new(cause);
                state.fail(&pending.key, ticket, &error);
                tracing::debug!(ticket, %error, "cache supplier failed");

                if cancelled {
                    Err(SyncError::Cancelled)
                } else {
                    Err(SyncError::Compute(error))
                }
            }
        };
        drop(state);

        self.monitor.notify_all(RESOLVED);
        result
    }

    /// Returns the committed value for `key` without blocking or computing.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        match self.monitor.lock().slots.get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Removes a committed entry so the next request recomputes it.
    ///
    /// Entries still being computed are left alone.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.monitor.lock().invalidate(key)
    }
}

/// Fails the pending slot if the supplier unwinds before resolving it.
struct PendingSlot<'a, K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    cache: &'a MemoCache<K, V>,
    key: K,
    ticket: u64,
    armed: bool,
}

impl<K, V> Drop for PendingSlot<'_, K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(ticket = self.ticket, "cache supplier panicked");
        let mut state = self.cache.monitor.lock();
        state.fail(&self.key, self.ticket, &ComputeError::panicked());
        drop(state);
        self.cache.monitor.notify_all(RESOLVED);
    }
}
