//! Wait policies shared by every blocking operation.
//!
//! A [`WaitConfig`] bounds how long a caller is willing to block, either by a
//! deadline, by a [`CancellationToken`], or both. Blocking primitives register
//! themselves with the token while they wait so that cancelling wakes the
//! sleeping thread instead of leaving it parked until the next notification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::errors::{SyncError, SyncResult};

/// Something that can be woken when a token it waits on is cancelled.
pub(crate) trait CancelListener: Send + Sync {
    fn on_cancel(&self);
}

struct TokenState {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Weak<dyn CancelListener>)>>,
}

/// `CancellationToken` is a cloneable, shared flag a caller uses to abort
/// pending waits and long-running work.
///
/// Cancelling is sticky: once cancelled, a token stays cancelled and every
/// subsequent wait configured with it returns [`SyncError::Cancelled`]
/// unless the awaited condition is already satisfied.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Flips the token into the cancelled state and wakes every
    /// primitive currently waiting on it.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let listeners: Vec<_> = {
            let guard = match self.state.listeners.lock() {
                Ok(g) => g,
                Err(e) => e.into_inner(),
            };
            guard.iter().filter_map(|(_, l)| l.upgrade()).collect()
        };

        tracing::debug!(listeners = listeners.len(), "cancellation token fired");
        for listener in listeners {
            listener.on_cancel();
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Cooperative checkpoint for long-running suppliers and stage actions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] once the token has been cancelled.
    pub fn checkpoint(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn register(&self, listener: Weak<dyn CancelListener>) -> Registration<'_> {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = match self.state.listeners.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        guard.push((id, listener));
        Registration { token: self, id }
    }
}

/// Removes a listener from its token when the wait that registered it ends.
pub(crate) struct Registration<'a> {
    token: &'a CancellationToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut guard = match self.token.state.listeners.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        guard.retain(|(id, _)| *id != self.id);
    }
}

/// Configuration for a single blocking call.
///
/// # Examples
///
/// ```
/// use foundation_sync::{CancellationToken, WaitConfig};
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let wait = WaitConfig::new()
///     .timeout(Duration::from_millis(250))
///     .cancel_with(token.clone());
///
/// assert!(wait.get_deadline().is_some());
/// assert!(wait.get_token().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WaitConfig {
    /// Instant after which the wait gives up
    deadline: Option<Instant>,
    /// Token that aborts the wait when cancelled
    token: Option<CancellationToken>,
}

impl WaitConfig {
    /// Creates an unbounded wait policy: block until the condition holds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deadline: None,
            token: None,
        }
    }

    /// Gives up once `duration` has elapsed from now.
    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.deadline = Instant::now().checked_add(duration);
        self
    }

    /// Gives up at the provided instant.
    #[must_use]
    pub const fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Aborts the wait when `token` is cancelled.
    #[must_use]
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    #[must_use]
    pub const fn get_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn get_token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// Checks whether the wait may continue, returning how long it may
    /// still sleep (`None` meaning unbounded).
    pub(crate) fn remaining(&self) -> SyncResult<Option<Duration>> {
        if let Some(token) = &self.token {
            token.checkpoint()?;
        }

        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(SyncError::Timeout)
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }
}
