use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// External service that actually performs a submission.
///
/// The queue never looks inside payloads or artifacts and never retries; a
/// submitter that wants retries, fee bumping or confirmation tracking does it
/// inside `submit`.
#[async_trait]
pub trait Submitter: Send + Sync + 'static {
    /// Unit of work handed to the service
    type Payload: Send + 'static;

    /// What a completed submission produces
    type Artifact: Send + 'static;

    /// Failure reported by the service. A submitter that can fail after
    /// producing a partial artifact should carry it in this type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submit one payload.
    ///
    /// `ctx` is cancelled when the queue's root token is cancelled or, under
    /// [`FailurePolicy::CancelGroup`](crate::FailurePolicy::CancelGroup), when
    /// a sibling submission fails. Honour it on a best-effort basis; the
    /// queue does not abort the call.
    async fn submit(
        &self,
        ctx: CancellationToken,
        payload: Self::Payload,
    ) -> Result<Self::Artifact, Self::Error>;
}

#[async_trait]
impl<S: Submitter> Submitter for Arc<S> {
    type Payload = S::Payload;
    type Artifact = S::Artifact;
    type Error = S::Error;

    async fn submit(
        &self,
        ctx: CancellationToken,
        payload: Self::Payload,
    ) -> Result<Self::Artifact, Self::Error> {
        (**self).submit(ctx, payload).await
    }
}
