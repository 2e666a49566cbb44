// Implements the guarded-wait monitor every primitive in this crate is built on.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::SyncError;
use crate::wait::{CancelListener, WaitConfig};

/// Index of one of the condition variables owned by a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Condition(usize);

impl Condition {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }
}

/// A wait that ended before its condition held.
///
/// The guard is handed back so the caller can roll back any bookkeeping
/// made on behalf of the abandoned wait while still holding the lock.
pub(crate) struct Interrupted<'a, S> {
    pub(crate) guard: MutexGuard<'a, S>,
    pub(crate) reason: SyncError,
}

/// `Monitor` pairs a mutex-protected state with one or more condition
/// variables.
///
/// Every wait is a loop that re-runs its `attempt` closure under the lock
/// after each wakeup, so spurious wakeups and notifications delivered before
/// the waiter went to sleep are both tolerated.
pub(crate) struct Monitor<S> {
    /// State guarded by the monitor.
    state: Mutex<S>,

    /// Condition variables signalled when the state changes.
    conditions: Box<[Condvar]>,
}

impl<S> Monitor<S> {
    pub(crate) fn new(state: S) -> Self {
        Self::with_conditions(state, 1)
    }

    pub(crate) fn with_conditions(state: S, count: usize) -> Self {
        Self {
            state: Mutex::new(state),
            conditions: (0..count.max(1)).map(|_| Condvar::new()).collect(),
        }
    }

    /// Locks the state. Poisoning is ignored: all mutations performed under
    /// this lock leave the state consistent before any user code runs.
    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_one(&self, condition: Condition) {
        self.conditions[condition.0].notify_one();
    }

    pub(crate) fn notify_all(&self, condition: Condition) {
        self.conditions[condition.0].notify_all();
    }

    /// Blocks on `condition` until `attempt` yields a value.
    pub(crate) fn block_for<'a, R, F>(
        &'a self,
        mut guard: MutexGuard<'a, S>,
        condition: Condition,
        mut attempt: F,
    ) -> (MutexGuard<'a, S>, R)
    where
        F: FnMut(&mut S) -> Option<R>,
    {
        let condvar = &self.conditions[condition.0];
        loop {
            if let Some(value) = attempt(&mut guard) {
                return (guard, value);
            }
            guard = condvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<S: Send + 'static> Monitor<S> {
    /// Blocks on `condition` until `attempt` yields a value or the wait
    /// policy gives up.
    ///
    /// `attempt` always runs before the policy is consulted, so a wait
    /// whose condition already holds succeeds even with an expired deadline
    /// or a cancelled token.
    ///
    /// `Interrupted` is only returned right after `attempt` failed under the
    /// same guard, so a waiter that gives up never leaves behind a wakeup
    /// it could have used.
    pub(crate) fn wait_for<'a, R, F>(
        self: &'a Arc<Self>,
        mut guard: MutexGuard<'a, S>,
        condition: Condition,
        wait: &WaitConfig,
        mut attempt: F,
    ) -> Result<(MutexGuard<'a, S>, R), Interrupted<'a, S>>
    where
        F: FnMut(&mut S) -> Option<R>,
    {
        if wait.get_deadline().is_none() && wait.get_token().is_none() {
            return Ok(self.block_for(guard, condition, attempt));
        }

        let _registration = wait.get_token().map(|token| {
            let listener: Weak<dyn CancelListener> = Arc::downgrade(self) as Weak<dyn CancelListener>;
            token.register(listener)
        });

        let condvar = &self.conditions[condition.0];
        loop {
            if let Some(value) = attempt(&mut guard) {
                return Ok((guard, value));
            }

            let remaining = match wait.remaining() {
                Ok(remaining) => remaining,
                Err(reason) => {
                    tracing::trace!(%reason, "monitor wait interrupted");
                    return Err(Interrupted { guard, reason });
                }
            };

            guard = match remaining {
                None => condvar.wait(guard).unwrap_or_else(PoisonError::into_inner),
                Some(duration) => {
                    condvar
                        .wait_timeout(guard, duration)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

impl<S: Send> CancelListener for Monitor<S> {
    fn on_cancel(&self) {
        // Taking the lock orders this wakeup after any waiter that checked
        // the token but has not yet gone to sleep.
        let _guard = self.lock();
        for condvar in &*self.conditions {
            condvar.notify_all();
        }
    }
}
