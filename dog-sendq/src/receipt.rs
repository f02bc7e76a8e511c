use crate::error::SubmitError;
use crate::submitter::Submitter;

/// Outcome of one accepted submission, delivered on the caller's channel.
///
/// Exactly one receipt is produced per accepted item. Receipts arrive in
/// completion order, not submission order; match them up by `id`.
#[derive(Debug)]
pub struct Receipt<T, A, E> {
    /// Correlation id supplied with the work
    pub id: T,
    /// Artifact on success, or the reason the submission failed
    pub outcome: Result<A, SubmitError<E>>,
}

/// Receipt type produced by a queue driving submitter `S`
pub type ReceiptOf<T, S> =
    Receipt<T, <S as Submitter>::Artifact, <S as Submitter>::Error>;

impl<T, A, E> Receipt<T, A, E> {
    pub fn new(id: T, outcome: Result<A, SubmitError<E>>) -> Self {
        Self { id, outcome }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn artifact(&self) -> Option<&A> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&SubmitError<E>> {
        self.outcome.as_ref().err()
    }

    pub fn into_parts(self) -> (T, Result<A, SubmitError<E>>) {
        (self.id, self.outcome)
    }
}
