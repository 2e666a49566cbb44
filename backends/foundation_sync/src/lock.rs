//! Non-reentrant mutual-exclusion lock built on a monitor.
//!
//! Unlike [`std::sync::Mutex`] the lock protects no data of its own; it
//! only arbitrates ownership between callers. Ownership is not tracked per
//! thread, which makes the lock strictly non-reentrant:
//!
//! ```no_run
//! use foundation_sync::NonReentrantLock;
//!
//! let lock = NonReentrantLock::new();
//! lock.acquire();
//! // The holder blocks forever here, waiting on itself.
//! lock.acquire();
//! ```
//!
//! Callers must never acquire the lock recursively.

use std::sync::Arc;

use crate::errors::SyncResult;
use crate::monitor::{Condition, Interrupted, Monitor};
use crate::wait::WaitConfig;

const RELEASED: Condition = Condition::new(0);

/// A binary lock with blocking acquire and single-waiter wakeup on release.
///
/// Cloning produces another handle to the same lock.
///
/// # Examples
///
/// ```
/// use foundation_sync::NonReentrantLock;
/// use std::thread;
///
/// let lock = NonReentrantLock::new();
///
/// let handle = {
///     let lock = lock.clone();
///     thread::spawn(move || {
///         let _guard = lock.guard();
///         // exclusive section
///     })
/// };
///
/// lock.acquire();
/// lock.release();
/// handle.join().unwrap();
/// ```
#[derive(Clone)]
pub struct NonReentrantLock {
    monitor: Arc<Monitor<bool>>,
}

impl Default for NonReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for NonReentrantLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NonReentrantLock")
            .field("held", &self.is_held())
            .finish()
    }
}

impl NonReentrantLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            monitor: Arc::new(Monitor::new(false)),
        }
    }

    /// Blocks until the lock is free, then takes it.
    pub fn acquire(&self) {
        let guard = self.monitor.lock();
        let (_held, ()) = self.monitor.block_for(guard, RELEASED, take);
    }

    /// Blocks until the lock is free or `wait` gives up.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`](crate::SyncError::Timeout) or
    /// [`SyncError::Cancelled`](crate::SyncError::Cancelled); the lock state
    /// is left untouched in both cases.
    pub fn acquire_with(&self, wait: &WaitConfig) -> SyncResult<()> {
        let guard = self.monitor.lock();
        match self.monitor.wait_for(guard, RELEASED, wait, take) {
            Ok(_) => Ok(()),
            // Interrupted only after `take` failed under the same guard, so
            // a wakeup meant for this waiter was never left unused.
            Err(Interrupted { reason, .. }) => Err(reason),
        }
    }

    /// Takes the lock if it is free, without blocking.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut held = self.monitor.lock();
        take(&mut held).is_some()
    }

    /// Frees the lock and wakes one blocked acquirer, if any.
    ///
    /// Releasing a lock that is not held is a no-op.
    pub fn release(&self) {
        let mut held = self.monitor.lock();
        let was_held = core::mem::replace(&mut *held, false);
        drop(held);

        if !was_held {
            tracing::warn!("release called on a NonReentrantLock that is not held");
            return;
        }
        self.monitor.notify_one(RELEASED);
    }

    /// Snapshot of whether some caller currently holds the lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.monitor.lock()
    }

    /// Acquires the lock and returns a guard releasing it on drop.
    #[must_use]
    pub fn guard(&self) -> LockGuard<'_> {
        self.acquire();
        LockGuard { lock: self }
    }

    /// Like [`Self::guard`] with a bounded wait.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::acquire_with`].
    pub fn guard_with(&self, wait: &WaitConfig) -> SyncResult<LockGuard<'_>> {
        self.acquire_with(wait)?;
        Ok(LockGuard { lock: self })
    }
}

fn take(held: &mut bool) -> Option<()> {
    if *held {
        None
    } else {
        *held = true;
        Some(())
    }
}

/// RAII ownership of a [`NonReentrantLock`].
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard<'a> {
    lock: &'a NonReentrantLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::CancellationToken;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// WHY: Validates the basic state transitions
    /// WHAT: acquire sets held, release clears it
    #[test]
    fn acquire_then_release() {
        let lock = NonReentrantLock::new();
        assert!(!lock.is_held());

        lock.acquire();
        assert!(lock.is_held());
        assert!(!lock.try_acquire());

        lock.release();
        assert!(!lock.is_held());
        assert!(lock.try_acquire());
    }

    /// WHY: The lock is non-reentrant; a second acquire by the holder must block
    /// WHAT: A bounded re-acquire from the holding thread times out
    #[test]
    #[ntest::timeout(5000)]
    fn reacquire_by_holder_blocks() {
        let lock = NonReentrantLock::new();
        lock.acquire();

        let wait = WaitConfig::new().timeout(Duration::from_millis(30));
        let err = lock.acquire_with(&wait).unwrap_err();
        assert!(err.is_timeout());
        assert!(lock.is_held());
    }

    /// WHY: Ownership must be exclusive across threads
    /// WHAT: No two threads are ever inside the critical section together
    #[test]
    #[ntest::timeout(20000)]
    fn critical_section_is_exclusive() {
        let lock = NonReentrantLock::new();
        let inside = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(AtomicI64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = Arc::clone(&inside);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let _guard = lock.guard();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        counter.fetch_add(1, Ordering::Relaxed);
                        counter.fetch_sub(1, Ordering::Relaxed);
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker should not panic");
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!lock.is_held());
    }

    /// WHY: A cancelled waiter must leave the lock as it found it
    /// WHAT: Cancelling a blocked acquire returns Cancelled and the holder still owns the lock
    #[test]
    #[ntest::timeout(5000)]
    fn cancelled_acquire_leaves_lock_untouched() {
        let lock = NonReentrantLock::new();
        lock.acquire();

        let token = CancellationToken::new();
        let (started, ready) = mpsc::channel::<()>();
        let waiter = {
            let lock = lock.clone();
            let wait = WaitConfig::new().cancel_with(token.clone());
            thread::spawn(move || {
                started.send(()).expect("should send");
                lock.acquire_with(&wait)
            })
        };

        ready.recv().expect("waiter should start");
        thread::sleep(Duration::from_millis(30));
        token.cancel();

        let result = waiter.join().expect("waiter should not panic");
        assert!(result.unwrap_err().is_cancelled());
        assert!(lock.is_held());

        lock.release();
        assert!(!lock.is_held());
    }

    /// WHY: A timed-out waiter must not swallow a wakeup meant for others
    /// WHAT: After one waiter times out, a release still hands the lock to the remaining waiter
    #[test]
    #[ntest::timeout(5000)]
    fn timed_out_waiter_does_not_steal_wakeup() {
        let lock = NonReentrantLock::new();
        lock.acquire();

        let impatient = {
            let lock = lock.clone();
            thread::spawn(move || {
                let wait = WaitConfig::new().timeout(Duration::from_millis(40));
                let acquired = lock.acquire_with(&wait);
                if acquired.is_ok() {
                    lock.release();
                }
                acquired
            })
        };

        let patient = {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.acquire();
                lock.release();
            })
        };

        thread::sleep(Duration::from_millis(40));
        lock.release();

        let _ = impatient.join().expect("impatient waiter should not panic");
        patient.join().expect("patient waiter should acquire eventually");
        assert!(!lock.is_held());
    }

    /// WHY: Releasing an unheld lock is misuse but must not corrupt state
    /// WHAT: The release is a logged no-op
    #[test]
    #[traced_test]
    fn release_of_free_lock_is_noop() {
        let lock = NonReentrantLock::new();
        lock.release();
        assert!(!lock.is_held());
        assert!(logs_contain("not held"));
    }
}
