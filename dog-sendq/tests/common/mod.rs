#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dog_sendq::{CancellationToken, Receipt, SubmitError, Submitter};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("service rejected the payload")]
    Rejected,
    #[error("submission cancelled")]
    Cancelled,
}

/// What the probe submitter does with a payload
#[derive(Debug, Clone)]
pub enum Job {
    /// Succeed with the value, unless the token is already cancelled
    Echo(u32),
    /// Sleep, then behave like `Echo`
    Sleep(Duration, u32),
    /// Fail straight away
    Fail,
    /// Wait for a permit on the gate (ignoring cancellation), then behave
    /// like `Echo`
    Gated(Arc<Semaphore>, u32),
    /// Wait for a permit on the gate, then fail
    GatedFail(Arc<Semaphore>),
    /// Wait for the token to be cancelled and report it
    AwaitCancel,
}

/// Shared record of what the probe submitter observed
#[derive(Debug, Default)]
pub struct Probe {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub calls: AtomicUsize,
    pub cancelled_seen: AtomicUsize,
}

impl Probe {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cancelled_seen(&self) -> usize {
        self.cancelled_seen.load(Ordering::SeqCst)
    }

    /// Poll until exactly `n` submissions are running
    pub async fn wait_active(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.active() != n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} active submissions, saw {}", self.active()));
    }
}

struct Running<'a>(&'a Probe);

impl<'a> Running<'a> {
    fn enter(probe: &'a Probe) -> Self {
        probe.calls.fetch_add(1, Ordering::SeqCst);
        let now = probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        probe.max_active.fetch_max(now, Ordering::SeqCst);
        Self(probe)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbeSubmitter {
    pub probe: Arc<Probe>,
}

impl ProbeSubmitter {
    pub fn new() -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        (
            Self {
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }

    fn echo(&self, ctx: &CancellationToken, value: u32) -> Result<u32, ProbeError> {
        if ctx.is_cancelled() {
            self.probe.cancelled_seen.fetch_add(1, Ordering::SeqCst);
            return Err(ProbeError::Cancelled);
        }
        Ok(value)
    }
}

#[async_trait]
impl Submitter for ProbeSubmitter {
    type Payload = Job;
    type Artifact = u32;
    type Error = ProbeError;

    async fn submit(&self, ctx: CancellationToken, job: Job) -> Result<u32, ProbeError> {
        let _running = Running::enter(&self.probe);
        match job {
            Job::Echo(value) => self.echo(&ctx, value),
            Job::Sleep(delay, value) => {
                tokio::time::sleep(delay).await;
                self.echo(&ctx, value)
            }
            Job::Fail => Err(ProbeError::Rejected),
            Job::Gated(gate, value) => {
                gate.acquire().await.expect("gate open").forget();
                self.echo(&ctx, value)
            }
            Job::GatedFail(gate) => {
                gate.acquire().await.expect("gate open").forget();
                Err(ProbeError::Rejected)
            }
            Job::AwaitCancel => {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        self.probe.cancelled_seen.fetch_add(1, Ordering::SeqCst);
                        Err(ProbeError::Cancelled)
                    }
                    _ = tokio::time::sleep(Duration::from_secs(5)) => Ok(0),
                }
            }
        }
    }
}

pub type ProbeReceipt<T> = Receipt<T, u32, ProbeError>;

pub fn gate() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(0))
}

/// Collect every receipt already sitting in the channel
pub fn drain_receipts<T>(rx: &mut mpsc::Receiver<ProbeReceipt<T>>) -> Vec<ProbeReceipt<T>> {
    let mut out = Vec::new();
    while let Ok(receipt) = rx.try_recv() {
        out.push(receipt);
    }
    out
}

pub fn is_cancelled<T>(receipt: &ProbeReceipt<T>) -> bool {
    matches!(
        receipt.outcome,
        Err(SubmitError::Submitter(ProbeError::Cancelled))
    )
}

pub fn is_rejected<T>(receipt: &ProbeReceipt<T>) -> bool {
    matches!(
        receipt.outcome,
        Err(SubmitError::Submitter(ProbeError::Rejected))
    )
}
