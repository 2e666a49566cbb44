//! Barrier forcing independent workers to complete in stage order.

use std::sync::Arc;

use crate::errors::{SyncError, SyncResult};
use crate::monitor::{Condition, Interrupted, Monitor};
use crate::wait::WaitConfig;

const ADVANCED: Condition = Condition::new(0);

struct StageState {
    /// Index of the stage allowed to run next; equals `completed + 1`.
    next: usize,
    /// Stages currently owned by an arrived caller.
    claimed: Vec<bool>,
}

/// A barrier that runs one action per stage, strictly in index order.
///
/// Each stage index is claimed by exactly one caller. A caller arriving for
/// stage `i` sleeps until stage `i - 1` has completed, runs its action, then
/// wakes everyone so the owner of stage `i + 1` can proceed. Physical start
/// order of the callers is irrelevant.
///
/// # Examples
///
/// ```
/// use foundation_sync::SequentialBarrier;
/// use std::sync::{Arc, Mutex};
/// use std::thread;
///
/// let barrier = SequentialBarrier::new(3).unwrap();
/// let order = Arc::new(Mutex::new(Vec::new()));
///
/// let handles: Vec<_> = (0..3).rev().map(|stage| {
///     let barrier = barrier.clone();
///     let order = Arc::clone(&order);
///     thread::spawn(move || {
///         barrier
///             .arrive_and_wait(stage, || order.lock().unwrap().push(stage))
///             .unwrap();
///     })
/// }).collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
/// ```
#[derive(Clone)]
pub struct SequentialBarrier {
    monitor: Arc<Monitor<StageState>>,
    stage_count: usize,
}

impl core::fmt::Debug for SequentialBarrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SequentialBarrier")
            .field("stage_count", &self.stage_count)
            .field("completed_stage", &self.completed_stage())
            .finish()
    }
}

impl SequentialBarrier {
    /// Creates a barrier over `stage_count` stages.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] when `stage_count` is zero.
    pub fn new(stage_count: usize) -> SyncResult<Self> {
        if stage_count == 0 {
            return Err(SyncError::InvalidArgument("barrier stage count must be > 0"));
        }

        Ok(Self {
            monitor: Arc::new(Monitor::new(StageState {
                next: 0,
                claimed: vec![false; stage_count],
            })),
            stage_count,
        })
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// The highest completed stage, or `None` before stage 0 completes.
    #[must_use]
    pub fn completed_stage(&self) -> Option<usize> {
        self.monitor.lock().next.checked_sub(1)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.monitor.lock().next == self.stage_count
    }

    /// Waits for every earlier stage, then runs `action` as stage `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStage`] if `stage` is out of range,
    /// already completed, or already claimed by another caller.
    pub fn arrive_and_wait<F, R>(&self, stage: usize, action: F) -> SyncResult<R>
    where
        F: FnOnce() -> R,
    {
        self.arrive_and_wait_with(stage, action, &WaitConfig::new())
    }

    /// Like [`Self::arrive_and_wait`], giving up on the wait according to
    /// `wait`. An abandoned arrival releases its claim on the stage, so
    /// another caller may arrive for it later.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStage`], [`SyncError::Timeout`] or
    /// [`SyncError::Cancelled`]; `action` has not run in any of these cases.
    pub fn arrive_and_wait_with<F, R>(
        &self,
        stage: usize,
        action: F,
        wait: &WaitConfig,
    ) -> SyncResult<R>
    where
        F: FnOnce() -> R,
    {
        let invalid = SyncError::InvalidStage {
            stage,
            stage_count: self.stage_count,
        };
        if stage >= self.stage_count {
            return Err(invalid);
        }

        let mut guard = self.monitor.lock();
        if stage < guard.next || guard.claimed[stage] {
            return Err(invalid);
        }
        guard.claimed[stage] = true;

        let result = self
            .monitor
            .wait_for(guard, ADVANCED, wait, |state| (state.next == stage).then_some(()));
        match result {
            Ok((guard, ())) => drop(guard),
            Err(Interrupted { mut guard, reason }) => {
                guard.claimed[stage] = false;
                tracing::debug!(stage, %reason, "stage arrival abandoned");
                return Err(reason);
            }
        }

        let mut running = RunningStage {
            barrier: self,
            stage,
            finished: false,
        };
        tracing::trace!(stage, "running stage action");
        let output = action();
        running.finish();

        Ok(output)
    }
}

/// Advances the barrier once the stage action returns, or releases the
/// claim if the action unwinds so the stage can be retried.
struct RunningStage<'a> {
    barrier: &'a SequentialBarrier,
    stage: usize,
    finished: bool,
}

impl RunningStage<'_> {
    fn finish(&mut self) {
        self.finished = true;

        let mut state = self.barrier.monitor.lock();
        state.next = self.stage + 1;
        drop(state);

        self.barrier.monitor.notify_all(ADVANCED);
    }
}

impl Drop for RunningStage<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::warn!(stage = self.stage, "stage action panicked, releasing claim");
        let mut state = self.barrier.monitor.lock();
        state.claimed[self.stage] = false;
    }
}
