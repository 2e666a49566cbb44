use std::error::Error;
use std::sync::Arc;

use derive_more::From;

pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// `SyncError` is the outcome of any blocking or validating operation
/// on the primitives of this crate.
#[derive(From, Debug, Clone)]
pub enum SyncError {
    /// The deadline elapsed while the caller was blocked.
    Timeout,

    /// The caller's cancellation token fired while it was blocked.
    Cancelled,

    /// A cache supplier failed; every waiter on the key sees the same cause.
    Compute(ComputeError),

    #[from(ignore)]
    InvalidArgument(&'static str),

    #[from(ignore)]
    InvalidStage { stage: usize, stage_count: usize },
}

impl SyncError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    #[must_use]
    pub fn is_compute(&self) -> bool {
        matches!(self, SyncError::Compute(_))
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Compute(err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for SyncError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SyncError::Timeout => write!(f, "SyncError::Timeout"),
            SyncError::Cancelled => write!(f, "SyncError::Cancelled"),
            SyncError::Compute(err) => write!(f, "SyncError::Compute({err})"),
            SyncError::InvalidArgument(reason) => {
                write!(f, "SyncError::InvalidArgument({reason})")
            }
            SyncError::InvalidStage { stage, stage_count } => write!(
                f,
                "SyncError::InvalidStage(stage {stage} of {stage_count} stages)"
            ),
        }
    }
}

/// `ComputeError` carries the failure of a cache supplier.
///
/// The cause is reference counted so a single failure can be handed
/// to the computing caller and to every thread blocked on the same key.
#[derive(Debug, Clone)]
pub struct ComputeError {
    cause: Arc<dyn Error + Send + Sync + 'static>,
}

impl ComputeError {
    pub(crate) fn new(cause: BoxedError) -> Self {
        Self {
            cause: Arc::from(cause),
        }
    }

    pub(crate) fn panicked() -> Self {
        Self::new("supplier panicked before committing a value".into())
    }

    /// Returns the underlying supplier error.
    #[must_use]
    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    /// Attempts to view the underlying cause as a concrete error type.
    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }
}

impl Error for ComputeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

impl core::fmt::Display for ComputeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.cause)
    }
}

/// `EnqueueError` hands a rejected item back to the producer together
/// with the reason it could not be queued.
pub struct EnqueueError<T> {
    item: T,
    reason: SyncError,
}

impl<T> EnqueueError<T> {
    pub(crate) fn new(item: T, reason: SyncError) -> Self {
        Self { item, reason }
    }

    #[must_use]
    pub fn reason(&self) -> &SyncError {
        &self.reason
    }

    /// Returns the item that was never inserted.
    pub fn into_inner(self) -> T {
        self.item
    }

    pub fn into_parts(self) -> (T, SyncError) {
        (self.item, self.reason)
    }
}

impl<T> From<EnqueueError<T>> for SyncError {
    fn from(value: EnqueueError<T>) -> Self {
        value.reason
    }
}

impl<T> core::fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnqueueError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> core::fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EnqueueError({})", self.reason)
    }
}

impl<T> Error for EnqueueError<T> {}
