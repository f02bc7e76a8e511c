use std::fmt;

use thiserror::Error;

/// Result type for queue setup operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised while configuring a send queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidConfig {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown failure policy: {0}")]
    UnknownFailurePolicy(String),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

/// Failure carried in a receipt when a submission did not produce an artifact
#[derive(Error, Debug)]
pub enum SubmitError<E> {
    /// The submitter returned an error; passed through untouched
    #[error("Submission failed: {0}")]
    Submitter(#[source] E),

    /// The submitter panicked while the submission was in flight
    #[error("Submitter panicked: {0}")]
    Panicked(String),
}

impl<E> SubmitError<E> {
    /// Borrow the submitter's own error, if that is what failed
    pub fn submitter_error(&self) -> Option<&E> {
        match self {
            Self::Submitter(err) => Some(err),
            Self::Panicked(_) => None,
        }
    }

    /// Take the submitter's own error, if that is what failed
    pub fn into_submitter_error(self) -> Option<E> {
        match self {
            Self::Submitter(err) => Some(err),
            Self::Panicked(_) => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

/// Rejection from [`SendQueue::try_send`](crate::SendQueue::try_send).
///
/// The current group had no free slot. Nothing was started and no counter
/// moved; the work is handed back to the caller.
#[derive(Error)]
#[error("Send queue is at capacity")]
pub struct QueueFull<T, P> {
    id: T,
    payload: P,
}

impl<T, P> QueueFull<T, P> {
    pub(crate) fn new(id: T, payload: P) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> &T {
        &self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Recover the rejected correlation id and payload
    pub fn into_inner(self) -> (T, P) {
        (self.id, self.payload)
    }
}

impl<T, P> fmt::Debug for QueueFull<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull").finish_non_exhaustive()
    }
}
