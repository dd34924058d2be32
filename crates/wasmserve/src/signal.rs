//! Long-poll reload rendezvous.
//!
//! Browsers park a request on the wait endpoint; a notify releases exactly one
//! parked request (oldest first). A notify that finds nobody waiting does
//! nothing: there is no pending signal for a later waiter to consume.
//!
//! Each waiter owns a one-shot channel registered under an opaque id. Dropping
//! the [`Waiter`] (for instance because the client hung up and the request
//! future was dropped) removes its registration without needing a notify.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Why a waiter was let go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// A notify claimed this waiter
    Notified,
    /// The server is stopping
    ShuttingDown,
}

#[derive(Debug, Default)]
struct Waiters {
    next_id: u64,
    queue: VecDeque<(u64, oneshot::Sender<Release>)>,
    closed: bool,
}

/// Registry of parked wait requests.
#[derive(Debug, Default)]
pub struct ReloadSignaler {
    waiters: Mutex<Waiters>,
}

impl ReloadSignaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter now. It is eligible for any later `notify`.
    pub fn subscribe(self: &Arc<Self>) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;

        if waiters.closed {
            let _ = tx.send(Release::ShuttingDown);
        } else {
            waiters.queue.push_back((id, tx));
            tracing::debug!(id, waiting = waiters.queue.len(), "Waiter registered");
        }

        Waiter {
            id,
            rx,
            signaler: Arc::clone(self),
        }
    }

    /// Block until released.
    pub async fn wait(self: &Arc<Self>) -> Release {
        self.subscribe().released().await
    }

    /// Release the oldest live waiter. Returns `false` if nobody was waiting.
    pub fn notify(&self) -> bool {
        let mut waiters = self.waiters.lock();
        while let Some((id, tx)) = waiters.queue.pop_front() {
            if tx.send(Release::Notified).is_ok() {
                tracing::debug!(id, "Waiter released");
                return true;
            }
        }
        tracing::debug!("Notify with no waiters");
        false
    }

    /// Release every waiter registered right now. Later waits are unaffected.
    pub fn notify_all(&self) -> usize {
        let mut waiters = self.waiters.lock();
        let released = waiters
            .queue
            .drain(..)
            .map(|(_, tx)| tx.send(Release::Notified))
            .filter(Result::is_ok)
            .count();
        tracing::debug!(released, "Notified all waiters");
        released
    }

    /// Release every waiter and answer future waits immediately.
    pub fn shutdown(&self) -> usize {
        let mut waiters = self.waiters.lock();
        waiters.closed = true;
        waiters
            .queue
            .drain(..)
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(_, tx)| tx.send(Release::ShuttingDown))
            .filter(Result::is_ok)
            .count()
    }

    /// Number of registered waiters.
    pub fn waiting(&self) -> usize {
        self.waiters.lock().queue.len()
    }

    fn remove(&self, id: u64) {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.queue.iter().position(|(entry, _)| *entry == id) {
            waiters.queue.remove(pos);
            tracing::debug!(id, "Waiter abandoned");
        }
    }
}

/// A registered wait. Deregisters itself when dropped.
#[derive(Debug)]
pub struct Waiter {
    id: u64,
    rx: oneshot::Receiver<Release>,
    signaler: Arc<ReloadSignaler>,
}

impl Waiter {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn released(mut self) -> Release {
        // The sender only disappears when it is consumed by a release.
        (&mut self.rx).await.unwrap_or(Release::ShuttingDown)
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.signaler.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_notify_without_waiters_is_noop() {
        let signaler = Arc::new(ReloadSignaler::new());
        assert!(!signaler.notify());

        // A later waiter must not see the earlier notify.
        let waiter = signaler.subscribe();
        assert!(timeout(SHORT, waiter.released()).await.is_err());
        assert_eq!(signaler.waiting(), 0);
    }

    #[tokio::test]
    async fn test_notify_releases_registered_waiter() {
        let signaler = Arc::new(ReloadSignaler::new());
        let waiter = signaler.subscribe();
        assert_eq!(signaler.waiting(), 1);

        assert!(signaler.notify());
        assert_eq!(
            timeout(SHORT, waiter.released()).await.unwrap(),
            Release::Notified
        );
        assert_eq!(signaler.waiting(), 0);
    }

    #[tokio::test]
    async fn test_one_notify_releases_exactly_one() {
        let signaler = Arc::new(ReloadSignaler::new());
        let first = signaler.subscribe();
        let second = signaler.subscribe();

        assert!(signaler.notify());
        assert_eq!(
            timeout(SHORT, first.released()).await.unwrap(),
            Release::Notified
        );
        assert_eq!(signaler.waiting(), 1);

        let pending = tokio::spawn(second.released());
        tokio::time::sleep(SHORT).await;
        assert!(!pending.is_finished());

        assert!(signaler.notify());
        assert_eq!(pending.await.unwrap(), Release::Notified);
    }

    #[tokio::test]
    async fn test_notify_all_releases_current_waiters() {
        let signaler = Arc::new(ReloadSignaler::new());
        let a = signaler.subscribe();
        let b = signaler.subscribe();

        assert_eq!(signaler.notify_all(), 2);
        assert_eq!(a.released().await, Release::Notified);
        assert_eq!(b.released().await, Release::Notified);

        let late = signaler.subscribe();
        assert!(timeout(SHORT, late.released()).await.is_err());
        assert_eq!(signaler.notify_all(), 0);
    }

    #[tokio::test]
    async fn test_dropped_waiter_frees_slot() {
        let signaler = Arc::new(ReloadSignaler::new());
        let waiter = signaler.subscribe();
        assert_eq!(signaler.waiting(), 1);

        drop(waiter);
        assert_eq!(signaler.waiting(), 0);
        assert!(!signaler.notify());
    }

    #[tokio::test]
    async fn test_cancelled_wait_task_frees_slot() {
        let signaler = Arc::new(ReloadSignaler::new());
        let task = {
            let signaler = Arc::clone(&signaler);
            tokio::spawn(async move { signaler.wait().await })
        };

        while signaler.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(signaler.waiting(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everyone() {
        let signaler = Arc::new(ReloadSignaler::new());
        let a = signaler.subscribe();
        let b = signaler.subscribe();

        assert_eq!(signaler.shutdown(), 2);
        assert_eq!(a.released().await, Release::ShuttingDown);
        assert_eq!(b.released().await, Release::ShuttingDown);

        // Late arrivals are answered at once.
        assert_eq!(
            timeout(SHORT, signaler.wait()).await.unwrap(),
            Release::ShuttingDown
        );
    }
}
