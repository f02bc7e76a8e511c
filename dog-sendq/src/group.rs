//! Cancellable bounded-concurrency execution groups.
//!
//! A [`Group`] pairs one cancellation token with one semaphore. Once the
//! token is cancelled the group is dead for new work, but tasks already
//! running in it keep their permits until they return. [`GroupLifecycle`]
//! hands out the live group and swaps a dead one for a fresh one, only after
//! the dead group has no running tasks left, so two groups never run work at
//! the same time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::observability::ObservabilityLayer;
use crate::sync::{WaitGroup, WaitGroupGuard};

/// One generation of execution context
#[derive(Debug)]
pub struct Group {
    id: u64,
    token: CancellationToken,
    permits: Option<Arc<Semaphore>>,
    tasks: WaitGroup,
    failed: AtomicBool,
}

impl Group {
    fn new(id: u64, token: CancellationToken, limit: Option<usize>) -> Self {
        Self {
            id,
            token,
            permits: limit.map(|n| Arc::new(Semaphore::new(n))),
            tasks: WaitGroup::new(),
            failed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Token handed to every submission running in this group
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A dead group accepts no new work
    pub fn is_dead(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Tasks registered with this group and not yet finished
    pub fn running(&self) -> usize {
        self.tasks.active()
    }

    pub fn available_permits(&self) -> Option<usize> {
        self.permits.as_ref().map(|p| p.available_permits())
    }

    /// Cancel the group because one of its tasks failed.
    ///
    /// Returns `true` only for the call that actually did the cancelling.
    pub(crate) fn fail(&self) -> bool {
        if self.failed.swap(true, Ordering::AcqRel) || self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Wait for every task currently registered with the group
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }
}

/// A reserved place in a group: registration plus, when bounded, a permit.
///
/// Dropping the slot releases both.
#[derive(Debug)]
pub struct Slot {
    group: Arc<Group>,
    _permit: Option<OwnedSemaphorePermit>,
    _task: WaitGroupGuard,
}

impl Slot {
    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }
}

/// Owner of the current [`Group`]
#[derive(Debug)]
pub struct GroupLifecycle {
    root: CancellationToken,
    limit: Option<usize>,
    current: Mutex<Option<Arc<Group>>>,
    latest: parking_lot::Mutex<Option<Arc<Group>>>,
    next_id: AtomicU64,
    observability: Arc<ObservabilityLayer>,
}

impl GroupLifecycle {
    pub fn new(
        root: CancellationToken,
        limit: Option<usize>,
        observability: Arc<ObservabilityLayer>,
    ) -> Self {
        Self {
            root,
            limit,
            current: Mutex::new(None),
            latest: parking_lot::Mutex::new(None),
            next_id: AtomicU64::new(1),
            observability,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    /// Most recently created group, without taking the swap lock
    pub fn latest(&self) -> Option<Arc<Group>> {
        self.latest.lock().clone()
    }

    /// Return the live group, replacing a dead or missing one.
    ///
    /// Replacement waits for the dead group's tasks to finish while holding
    /// the swap lock. Those tasks never take the lock, so this cannot
    /// deadlock. Dropping the future mid-drain leaves the dead group in
    /// place for the next caller to finish draining.
    pub async fn acquire(&self) -> Arc<Group> {
        let mut current = self.current.lock().await;

        if let Some(group) = current.as_ref() {
            if !group.is_dead() {
                return Arc::clone(group);
            }
            debug!(group = group.id, running = group.running(), "draining dead group");
            group.tasks.close_when_idle().await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let group = Arc::new(Group::new(id, self.root.child_token(), self.limit));
        info!(group = id, limit = ?self.limit, "created execution group");
        self.observability.record_group_created(id, self.limit);

        *self.latest.lock() = Some(Arc::clone(&group));
        *current = Some(Arc::clone(&group));
        group
    }

    /// Reserve a slot, waiting for room if the live group is full.
    ///
    /// A waiter whose group dies underneath it moves on to the replacement
    /// group, unless the root itself is cancelled (every new group would be
    /// born dead, so it stays and runs with a cancelled token).
    pub async fn reserve(&self) -> Slot {
        loop {
            let group = self.acquire().await;
            let Some(task) = group.tasks.try_enter() else {
                continue;
            };
            let Some(permits) = group.permits.clone() else {
                return Slot {
                    group,
                    _permit: None,
                    _task: task,
                };
            };

            let follow_replacement = !self.root.is_cancelled();
            let permit = tokio::select! {
                biased;
                _ = group.token.cancelled(), if follow_replacement => {
                    debug!(group = group.id, "group died while waiting for a slot; moving on");
                    continue;
                }
                acquired = permits.acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    // Group semaphores are never closed.
                    Err(_) => continue,
                },
            };

            return Slot {
                group,
                _permit: Some(permit),
                _task: task,
            };
        }
    }

    /// Reserve a slot only if one is free right now.
    ///
    /// `None` leaves no trace: no permit is held and no task is registered.
    pub async fn try_reserve(&self) -> Option<Slot> {
        loop {
            let group = self.acquire().await;
            let Some(task) = group.tasks.try_enter() else {
                continue;
            };
            let permit = match group.permits.clone() {
                None => None,
                Some(permits) => match permits.try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => return None,
                },
            };
            return Some(Slot {
                group,
                _permit: permit,
                _task: task,
            });
        }
    }
}
