use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counter {
    active: usize,
    closed: bool,
}

/// Async counter of outstanding work that can be waited on until it drains.
///
/// Each unit of work holds a [`WaitGroupGuard`]; dropping the guard marks it
/// done. A closed group refuses [`try_enter`](Self::try_enter), which lets an
/// owner retire it atomically with respect to late arrivals.
#[derive(Debug, Clone)]
pub struct WaitGroup {
    state: Arc<watch::Sender<Counter>>,
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitGroup {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Counter::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Register one unit of work, even if the group is closed.
    pub fn enter(&self) -> WaitGroupGuard {
        self.state.send_modify(|c| c.active += 1);
        WaitGroupGuard {
            state: Arc::clone(&self.state),
        }
    }

    /// Register one unit of work unless the group has been closed.
    pub fn try_enter(&self) -> Option<WaitGroupGuard> {
        let mut entered = false;
        self.state.send_if_modified(|c| {
            if c.closed {
                return false;
            }
            c.active += 1;
            entered = true;
            true
        });
        entered.then(|| WaitGroupGuard {
            state: Arc::clone(&self.state),
        })
    }

    pub fn active(&self) -> usize {
        self.state.borrow().active
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Wait until no work is outstanding.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|c| c.active == 0).await;
    }

    /// Wait until no work is outstanding, then close the group in the same
    /// step so nothing can slip in between. Safe to call again.
    pub async fn close_when_idle(&self) {
        let mut rx = self.state.subscribe();
        loop {
            let _ = rx.wait_for(|c| c.active == 0).await;
            let mut idle = false;
            self.state.send_if_modified(|c| {
                if c.active != 0 {
                    return false;
                }
                idle = true;
                let changed = !c.closed;
                c.closed = true;
                changed
            });
            if idle {
                return;
            }
        }
    }
}

/// Marks one unit of work as done when dropped
#[derive(Debug)]
pub struct WaitGroupGuard {
    state: Arc<watch::Sender<Counter>>,
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        self.state.send_modify(|c| {
            debug_assert!(c.active > 0, "wait group underflow");
            c.active = c.active.saturating_sub(1);
        });
    }
}
