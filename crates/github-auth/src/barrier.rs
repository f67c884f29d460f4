//! One-shot async gate with a deadline
//!
//! A `Barrier` starts pending and settles exactly once: either `open()` is
//! called or the deadline passes, whichever happens first. Clones share one
//! single-assignment cell, so every waiter observes the same outcome. A
//! settled barrier never reopens; the next wait cycle needs a fresh one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Terminal state of a barrier.
///
/// Both are successful settlements. Callers that care whether a token
/// actually arrived check the token store afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOutcome {
    Opened,
    Expired,
}

/// Shared handle to a one-shot gate.
#[derive(Debug, Clone)]
pub struct Barrier {
    cell: Arc<watch::Sender<Option<BarrierOutcome>>>,
    deadline: Instant,
}

impl Barrier {
    /// Create a pending barrier that expires `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        let (cell, _) = watch::channel(None);
        Self {
            cell: Arc::new(cell),
            deadline: Instant::now() + timeout,
        }
    }

    /// Open the barrier. No-op once settled.
    pub fn open(&self) {
        if self.settle(BarrierOutcome::Opened) {
            debug!("barrier opened");
        }
    }

    /// Terminal outcome, or `None` while still pending.
    pub fn outcome(&self) -> Option<BarrierOutcome> {
        *self.cell.borrow()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait until the barrier is opened or its deadline passes.
    ///
    /// Returns immediately if already settled. The first waiter to observe
    /// the deadline settles the cell as `Expired`; an `open()` that lost the
    /// race has no effect, and vice versa.
    pub async fn wait(&self) -> BarrierOutcome {
        let mut rx = self.cell.subscribe();
        let timed_out = tokio::time::timeout_at(self.deadline, rx.wait_for(Option::is_some))
            .await
            .is_err();

        if timed_out && self.settle(BarrierOutcome::Expired) {
            debug!("barrier expired");
        }

        // The cell is always settled here: either wait_for saw a value or we
        // just tried to store Expired.
        self.outcome().unwrap_or(BarrierOutcome::Expired)
    }

    /// Store `outcome` if the cell is still pending. Returns whether it won.
    fn settle(&self, outcome: BarrierOutcome) -> bool {
        self.cell.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(outcome);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn expires_at_deadline_without_open() {
        let barrier = Barrier::new(TIMEOUT);
        let start = Instant::now();

        let outcome = barrier.wait().await;

        assert_eq!(outcome, BarrierOutcome::Expired);
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT, "resolved early: {elapsed:?}");
        assert!(elapsed < TIMEOUT + Duration::from_secs(1), "resolved late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn open_resolves_pending_waiter_immediately() {
        let barrier = Barrier::new(TIMEOUT);
        let start = Instant::now();

        let waiter = tokio::spawn({
            let barrier = barrier.clone();
            async move { barrier.wait().await }
        });
        tokio::task::yield_now().await;
        barrier.open();

        assert_eq!(waiter.await.unwrap(), BarrierOutcome::Opened);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn second_open_is_noop() {
        let barrier = Barrier::new(TIMEOUT);
        barrier.open();
        barrier.open();

        assert_eq!(barrier.outcome(), Some(BarrierOutcome::Opened));
        assert_eq!(barrier.wait().await, BarrierOutcome::Opened);
    }

    #[tokio::test(start_paused = true)]
    async fn open_after_expiry_has_no_effect() {
        let barrier = Barrier::new(Duration::from_secs(5));
        assert_eq!(barrier.wait().await, BarrierOutcome::Expired);

        barrier.open();

        assert_eq!(barrier.outcome(), Some(BarrierOutcome::Expired));
        assert_eq!(barrier.wait().await, BarrierOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn all_waiters_observe_the_same_outcome() {
        let barrier = Barrier::new(TIMEOUT);

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let barrier = barrier.clone();
                tokio::spawn(async move { barrier.wait().await })
            })
            .collect();
        tokio::task::yield_now().await;
        barrier.open();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), BarrierOutcome::Opened);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_share_one_deadline() {
        let barrier = Barrier::new(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(8)).await;

        // A late waiter does not get a fresh 10s window
        let start = Instant::now();
        assert_eq!(barrier.wait().await, BarrierOutcome::Expired);
        assert!(start.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn pending_until_settled() {
        let barrier = Barrier::new(TIMEOUT);
        assert_eq!(barrier.outcome(), None);
    }
}
