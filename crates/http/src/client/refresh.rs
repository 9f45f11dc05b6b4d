//! Token refresh coordination
//!
//! When several requests fail with an expired access token at once, only
//! the first one (the leader) calls the refresh endpoint. The rest wait in
//! a FIFO queue and are released together, exactly once, when the leader
//! settles.
//!
//! The test-and-set of the `refreshing` flag happens inside one critical
//! section with no `.await` in it, so a second failure always sees the flag
//! already set.
//!
//! Every [`reset`](RefreshState::reset) starts a new epoch. Requests and
//! leaders carry the epoch they began in; anything from an earlier epoch
//! belongs to a session that no longer exists and is never allowed to
//! touch the current one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// How a refresh settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New access token to replay with
    Refreshed(String),
    /// Refresh is impossible; the session is gone
    Failed,
}

/// What a request that hit an expired token should do next
#[derive(Debug)]
pub enum RefreshSlot {
    /// Call the refresh endpoint, then settle through the guard
    Leader(RefreshLeader),
    /// Wait for the leader
    Follower(oneshot::Receiver<RefreshOutcome>),
    /// The token was already rotated by this burst; replay with it
    Ready(String),
    /// The session was torn down or replaced
    Expired,
}

#[derive(Debug, Default)]
struct Inner {
    epoch: u64,
    refreshing: bool,
    queue: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

impl Inner {
    fn take_queue(&mut self) -> VecDeque<oneshot::Sender<RefreshOutcome>> {
        self.refreshing = false;
        std::mem::take(&mut self.queue)
    }
}

fn notify_waiters(queue: VecDeque<oneshot::Sender<RefreshOutcome>>, outcome: &RefreshOutcome) -> usize {
    let released = queue.len();
    for waiter in queue {
        // A waiter whose caller gave up has nothing to resume.
        let _ = waiter.send(outcome.clone());
    }
    released
}

/// Refresh flag and queue of pending requests
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    inner: Arc<Mutex<Inner>>,
}

impl RefreshState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session epoch
    ///
    /// Read before the request picks up its token.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Decide the role of a request whose token `stale` was rejected
    ///
    /// `epoch` is the value of [`epoch`](Self::epoch) when the request
    /// started. `current` reads the token store. It runs inside the
    /// critical section so a refresh that settles concurrently cannot be
    /// missed.
    pub fn acquire_refresh_slot(
        &self,
        stale: &str,
        epoch: u64,
        current: impl FnOnce() -> Option<String>,
    ) -> RefreshSlot {
        let mut inner = self.lock();

        if inner.epoch != epoch {
            trace!(request_epoch = epoch, epoch = inner.epoch, "Rejected token belongs to an ended session");
            return RefreshSlot::Expired;
        }

        if inner.refreshing {
            let (tx, rx) = oneshot::channel();
            inner.queue.push_back(tx);
            trace!(queued = inner.queue.len(), "Queued request behind token refresh");
            return RefreshSlot::Follower(rx);
        }

        match current() {
            None => RefreshSlot::Expired,
            Some(token) if token != stale => RefreshSlot::Ready(token),
            Some(_) => {
                inner.refreshing = true;
                RefreshSlot::Leader(RefreshLeader {
                    state: self.clone(),
                    epoch: inner.epoch,
                    settled: false,
                })
            }
        }
    }

    /// Clear the flag and release every queued request, oldest first
    ///
    /// Returns how many requests were released.
    pub fn release_refresh_slot(&self, outcome: &RefreshOutcome) -> usize {
        let queue = self.lock().take_queue();
        notify_waiters(queue, outcome)
    }

    /// Start a new epoch, failing whatever was queued
    ///
    /// A refresh still in flight keeps running but can no longer settle.
    pub fn reset(&self) {
        let queue = {
            let mut inner = self.lock();
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.take_queue()
        };
        let released = notify_waiters(queue, &RefreshOutcome::Failed);
        if released > 0 {
            debug!(released, "Refresh state reset with queued requests");
        }
    }

    /// Whether a refresh call is in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of requests waiting on the refresh
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }
}

/// Held by the request that owns the refresh call
///
/// Dropping it unsettled releases the queue with [`RefreshOutcome::Failed`].
#[derive(Debug)]
pub struct RefreshLeader {
    state: RefreshState,
    epoch: u64,
    settled: bool,
}

impl RefreshLeader {
    /// Whether the session this refresh belongs to is still the current one
    pub fn is_current(&self) -> bool {
        self.state.lock().epoch == self.epoch
    }

    /// Release the queue with the refresh result
    ///
    /// Returns how many requests were released; 0 once the state was reset.
    pub fn settle(self, outcome: &RefreshOutcome) -> usize {
        self.settle_with(|| (outcome.clone(), ()))
            .map_or(0, |((), released)| released)
    }

    /// Apply the refresh result to the session and release the queue
    ///
    /// `commit` runs under the state lock and returns the outcome for the
    /// queue plus a value for the leader. If the state was reset since the
    /// refresh started, `commit` is not run and `None` is returned.
    pub fn settle_with<T>(
        mut self,
        commit: impl FnOnce() -> (RefreshOutcome, T),
    ) -> Option<(T, usize)> {
        self.settled = true;

        let (outcome, value, queue) = {
            let mut inner = self.state.lock();
            if inner.epoch != self.epoch {
                return None;
            }
            let (outcome, value) = commit();
            (outcome, value, inner.take_queue())
        };

        Some((value, notify_waiters(queue, &outcome)))
    }
}

impl Drop for RefreshLeader {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let queue = {
            let mut inner = self.state.lock();
            if inner.epoch != self.epoch {
                return;
            }
            inner.take_queue()
        };
        warn!("Token refresh abandoned before it settled");
        notify_waiters(queue, &RefreshOutcome::Failed);
    }
}
