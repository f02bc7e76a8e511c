//! # dog-sendq: bounded-concurrency send queue
//!
//! `dog-sendq` sits in front of a slow or unreliable submission service and
//! drives it with a fixed number of submissions in flight:
//!
//! - **Bounded concurrency**: at most `max_pending` calls to the service run
//!   at once, also across execution-group replacements.
//! - **Two intake modes**: [`SendQueue::send`] waits for room,
//!   [`SendQueue::try_send`] rejects immediately with no side effects.
//! - **Backpressure reporting**: a callback sees the in-flight count after
//!   every start and finish.
//! - **Correlated receipts**: every accepted item yields exactly one
//!   [`Receipt`] on a caller-owned channel, tagged with the caller's id.
//! - **Group cancellation**: submissions share a cancellable group; a failure
//!   cancels its siblings (configurable), and the next submission gets a
//!   fresh group.
//! - **Drain**: [`SendQueue::wait`] returns once everything accepted has
//!   finished and been delivered.
//!
//! ## Quick start
//!
//! ```ignore
//! use dog_sendq::prelude::*;
//! use tokio::sync::mpsc;
//!
//! struct Broadcaster { /* rpc client */ }
//!
//! #[async_trait]
//! impl Submitter for Broadcaster {
//!     type Payload = SignedTx;
//!     type Artifact = TxReceipt;
//!     type Error = RpcError;
//!
//!     async fn submit(&self, ctx: CancellationToken, tx: SignedTx) -> Result<TxReceipt, RpcError> {
//!         tokio::select! {
//!             _ = ctx.cancelled() => Err(RpcError::Cancelled),
//!             receipt = self.send_and_confirm(tx) => receipt,
//!         }
//!     }
//! }
//!
//! let queue = SendQueue::with_config(shutdown.clone(), broadcaster, QueueConfig::new(8))
//!     .with_pending_callback(|n| tracing::debug!(pending = n, "in flight"));
//!
//! let (tx, mut receipts) = mpsc::channel(64);
//! for (nonce, signed) in batch {
//!     queue.send(nonce, signed, tx.clone()).await;
//! }
//! queue.wait().await;
//! ```

pub mod config;
pub mod error;
pub mod group;
pub mod observability;
pub mod queue;
pub mod receipt;
pub mod submitter;
pub mod sync;

pub use config::{FailurePolicy, QueueConfig};
pub use error::{QueueError, QueueFull, QueueResult, SubmitError};
pub use observability::{MetricsSnapshot, ObservabilityLayer, QueueMetrics, SendEvent};
pub use queue::{PendingCallback, ReceiptSender, SendQueue};
pub use receipt::{Receipt, ReceiptOf};
pub use submitter::Submitter;

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

pub use tokio_util::sync::CancellationToken;

/// Everything needed to implement a submitter and drive a queue
pub mod prelude {
    pub use crate::{
        CancellationToken, FailurePolicy, QueueConfig, QueueFull, Receipt, SendQueue,
        SubmitError, Submitter,
    };

    pub use async_trait::async_trait;
}
