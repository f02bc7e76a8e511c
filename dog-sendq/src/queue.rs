use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::config::{FailurePolicy, QueueConfig};
use crate::error::{QueueFull, SubmitError};
use crate::group::{Group, GroupLifecycle, Slot};
use crate::observability::{MetricsSnapshot, ObservabilityLayer, SendEvent};
use crate::receipt::{Receipt, ReceiptOf};
use crate::submitter::Submitter;
use crate::sync::{WaitGroup, WaitGroupGuard};

/// Callback told the in-flight submission count after every change
pub type PendingCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Sender half of a caller-owned receipt channel
pub type ReceiptSender<T, S> = mpsc::Sender<ReceiptOf<T, S>>;

/// Bounded-concurrency queue in front of a [`Submitter`].
///
/// Work is tagged with a caller-chosen correlation id of type `T`. Every
/// accepted item produces exactly one [`Receipt`] on the channel it was sent
/// with; receipts are delivered from their own task so a slow reader never
/// holds a concurrency slot.
///
/// Cloning is cheap and every clone drives the same queue.
pub struct SendQueue<T, S: Submitter> {
    lifecycle: Arc<GroupLifecycle>,
    executor: Arc<Executor<S>>,
    receipts: WaitGroup,
    _id: PhantomData<fn() -> T>,
}

impl<T, S> SendQueue<T, S>
where
    T: Send + 'static,
    S: Submitter,
{
    /// Create an unbounded queue with the default configuration.
    pub fn new(root: CancellationToken, submitter: S) -> Self {
        Self::with_config(root, submitter, QueueConfig::default())
    }

    /// Create a queue with a custom configuration.
    ///
    /// Cancelling `root` cancels every submission in flight; the queue keeps
    /// accepting work, which then runs with a cancelled token.
    pub fn with_config(root: CancellationToken, submitter: S, config: QueueConfig) -> Self {
        let observability = Arc::new(ObservabilityLayer::new());
        let limit = config.effective_limit();
        let noop: PendingCallback = Arc::new(|_| {});
        info!(max_pending = config.max_pending, failure_policy = %config.failure_policy, "created send queue");

        Self {
            lifecycle: Arc::new(GroupLifecycle::new(root, limit, Arc::clone(&observability))),
            executor: Arc::new(Executor {
                submitter: Arc::new(submitter),
                pending: Arc::new(AtomicU64::new(0)),
                on_pending_changed: RwLock::new(noop),
                failure_policy: config.failure_policy,
                observability,
            }),
            receipts: WaitGroup::new(),
            _id: PhantomData,
        }
    }

    /// Report the in-flight count to `callback` on every start and finish.
    ///
    /// Replaces any earlier callback for this queue and every clone of it.
    /// Called synchronously from the submission task; keep it quick or it
    /// delays the release of the task's slot. A panic inside the callback is
    /// logged and otherwise ignored.
    pub fn with_pending_callback<F>(self, callback: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        *self.executor.on_pending_changed.write() = Arc::new(callback);
        self
    }

    /// Send one item, waiting for room if the queue is at `max_pending`.
    ///
    /// Returns once the submission has a slot and has been started; its
    /// receipt arrives later on `receipts`. If this future is dropped before
    /// it completes, the item was not accepted.
    #[instrument(skip_all, fields(limit = ?self.lifecycle.limit()))]
    pub async fn send(&self, id: T, payload: S::Payload, receipts: ReceiptSender<T, S>) {
        let delivery = self.receipts.enter();
        let slot = self.lifecycle.reserve().await;
        self.start(slot, delivery, id, payload, receipts);
    }

    /// Send one item only if a slot is free right now.
    ///
    /// On rejection nothing happens: no task starts, the pending count and
    /// its callback are untouched, and the work comes back in [`QueueFull`].
    #[instrument(skip_all, fields(limit = ?self.lifecycle.limit()))]
    pub async fn try_send(
        &self,
        id: T,
        payload: S::Payload,
        receipts: ReceiptSender<T, S>,
    ) -> Result<(), QueueFull<T, S::Payload>> {
        let Some(slot) = self.lifecycle.try_reserve().await else {
            debug!("no free slot; rejecting");
            self.executor.observability.record_rejected();
            return Err(QueueFull::new(id, payload));
        };
        let delivery = self.receipts.enter();
        self.start(slot, delivery, id, payload, receipts);
        Ok(())
    }

    /// Wait until every accepted item has finished and had its receipt
    /// delivered. The queue can be used again afterwards.
    pub async fn wait(&self) {
        self.receipts.wait().await;
        if let Some(group) = self.lifecycle.latest() {
            group.wait().await;
        }
    }

    /// Submissions currently in flight
    pub fn pending(&self) -> u64 {
        self.executor.pending.load(Ordering::SeqCst)
    }

    /// Enforced concurrency limit, `None` when unbounded
    pub fn max_pending(&self) -> Option<usize> {
        self.lifecycle.limit()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.executor.failure_policy
    }

    /// Root token every group derives from
    pub fn root(&self) -> &CancellationToken {
        self.lifecycle.root()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.executor.observability.metrics().snapshot()
    }

    pub fn events(&self) -> broadcast::Receiver<SendEvent> {
        self.executor.observability.subscribe()
    }

    pub fn event_stream(&self) -> BroadcastStream<SendEvent> {
        self.executor.observability.event_stream()
    }

    fn start(
        &self,
        slot: Slot,
        delivery: WaitGroupGuard,
        id: T,
        payload: S::Payload,
        receipts: ReceiptSender<T, S>,
    ) {
        self.executor.observability.record_accepted();
        let executor = Arc::clone(&self.executor);
        tokio::spawn(
            async move {
                let receipt = executor.execute_one(&slot, id, payload).await;
                deliver(receipt, receipts, delivery);
                drop(slot);
            }
            .in_current_span(),
        );
    }
}

impl<T, S: Submitter> Clone for SendQueue<T, S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
            executor: Arc::clone(&self.executor),
            receipts: self.receipts.clone(),
            _id: PhantomData,
        }
    }
}

impl<T, S: Submitter> fmt::Debug for SendQueue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendQueue")
            .field("limit", &self.lifecycle.limit())
            .field("pending", &self.executor.pending.load(Ordering::Relaxed))
            .field("undelivered", &self.receipts.active())
            .field("failure_policy", &self.executor.failure_policy)
            .finish()
    }
}

/// Everything a submission task needs, shared by all of them
struct Executor<S: Submitter> {
    submitter: Arc<S>,
    pending: Arc<AtomicU64>,
    on_pending_changed: RwLock<PendingCallback>,
    failure_policy: FailurePolicy,
    observability: Arc<ObservabilityLayer>,
}

impl<S: Submitter> Executor<S> {
    async fn execute_one<T>(&self, slot: &Slot, id: T, payload: S::Payload) -> ReceiptOf<T, S> {
        let group = slot.group();

        let outcome = {
            let _pending = PendingGuard::enter(self, group);
            let call = self.submitter.submit(group.token().clone(), payload);
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(artifact)) => Ok(artifact),
                Ok(Err(err)) => Err(SubmitError::Submitter(err)),
                Err(panic) => Err(SubmitError::Panicked(panic_message(panic))),
            }
        };

        let pending = self.pending.load(Ordering::SeqCst);
        match &outcome {
            Ok(_) => {
                debug!(group = group.id(), pending, "submission succeeded");
                self.observability.record_finished(group.id(), pending, true, false);
            }
            Err(err) => {
                if err.is_panic() {
                    warn!(group = group.id(), error = %err, "submitter panicked");
                } else {
                    debug!(group = group.id(), error = %err, "submission failed");
                }
                self.observability
                    .record_finished(group.id(), pending, false, err.is_panic());
                self.on_failure(group, err);
            }
        }

        Receipt::new(id, outcome)
    }

    /// Sibling cancellation: the first failure in a group cancels its token.
    fn on_failure(&self, group: &Group, err: &SubmitError<S::Error>) {
        if self.failure_policy != FailurePolicy::CancelGroup {
            return;
        }
        if group.fail() {
            warn!(group = group.id(), error = %err, "submission failed; cancelling sibling submissions");
            self.observability.record_group_cancelled(group.id());
        }
    }
}

/// Holds one unit of the pending count for the duration of a submitter call
struct PendingGuard<'a> {
    pending: &'a AtomicU64,
    on_pending_changed: &'a RwLock<PendingCallback>,
}

impl<'a> PendingGuard<'a> {
    fn enter<S: Submitter>(executor: &'a Executor<S>, group: &Group) -> Self {
        let pending = executor.pending.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = Self {
            pending: &executor.pending,
            on_pending_changed: &executor.on_pending_changed,
        };
        report_pending(guard.on_pending_changed, pending);
        executor.observability.record_started(group.id(), pending);
        debug!(group = group.id(), pending, "submission started");
        guard
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let pending = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        report_pending(self.on_pending_changed, pending);
    }
}

/// Run the caller's callback without letting a panic in it unwind the
/// submission task.
fn report_pending(callback: &RwLock<PendingCallback>, pending: u64) {
    let callback = callback.read().clone();
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(pending))) {
        warn!(pending, panic = %panic_message(panic), "pending callback panicked");
    }
}

/// Hand a receipt to the caller from a task of its own, then mark it
/// delivered. Runs detached from the submission slot.
fn deliver<T, A, E>(
    receipt: Receipt<T, A, E>,
    receipts: mpsc::Sender<Receipt<T, A, E>>,
    delivery: WaitGroupGuard,
) where
    T: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    tokio::spawn(
        async move {
            if receipts.send(receipt).await.is_err() {
                debug!("receipt receiver dropped; discarding receipt");
            }
            drop(delivery);
        }
        .in_current_span(),
    );
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = panic.downcast_ref::<String>() {
        return msg.clone();
    }
    "submitter panicked".to_string()
}
