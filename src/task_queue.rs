//! FIFO serializer for operations the target handles one at a time.
//!
//! Tasks posted to a [`TaskQueue`] run strictly in arrival order, and a task
//! does not start before the previous one has produced its result, whether
//! that result is a success or a failure.
//!
//! ```ignore
//! let queue = TaskQueue::new();
//! let png = queue.post(session.send_command(capture)).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

// ============================================================================
// TaskQueue
// ============================================================================

/// Runs posted futures one at a time, first in first out.
///
/// Cloning shares the queue.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    inner: Arc<TaskQueueInner>,
}

#[derive(Debug, Default)]
struct TaskQueueInner {
    /// Tokio's mutex queues waiters fairly, which gives FIFO order.
    turn: Mutex<()>,
    pending: AtomicUsize,
}

/// Decrements the pending count however `post` exits.
struct PendingSlot<'a>(&'a AtomicUsize);

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after every previously posted task has finished.
    ///
    /// The future is not polled until its turn. Dropping the returned future
    /// gives up the place in line.
    pub async fn post<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        let _slot = PendingSlot(&self.inner.pending);

        let _turn = self.inner.turn.lock().await;
        task.await
    }

    /// Number of posted tasks that have not finished yet, running one included.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex as SyncMutex;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready, task};

    use crate::error::{Error, Result};

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_in_post_order() {
        let queue = TaskQueue::new();
        let log = Arc::new(SyncMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (n, delay) in [(1_u32, 300_u64), (2, 100), (3, 200)] {
            let queue = queue.clone();
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                queue
                    .post(async move {
                        log.lock().push(format!("start {n}"));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        log.lock().push(format!("end {n}"));
                        n
                    })
                    .await
            }));
            // Each spawn reaches the queue before the next one is created.
            tokio::task::yield_now().await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.expect("join"));
        }

        assert_eq!(results, vec![1, 2, 3]);
        assert_eq!(
            *log.lock(),
            vec!["start 1", "end 1", "start 2", "end 2", "start 3", "end 3"]
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_failure_releases_next_task() {
        let queue = TaskQueue::new();

        let failed: Result<()> = queue
            .post(async { Err(Error::invalid_argument("capture failed")) })
            .await;
        assert!(failed.is_err());

        let next: Result<u8> = queue.post(async { Ok(7) }).await;
        assert_eq!(next.expect("second task"), 7);
    }

    #[tokio::test]
    async fn test_second_task_waits_for_first() {
        let queue = TaskQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let mut first = task::spawn(queue.post(async move {
            let _ = release_rx.await;
            "first"
        }));
        assert_pending!(first.poll());

        let started = Arc::new(SyncMutex::new(false));
        let mut second = task::spawn(queue.post({
            let started = Arc::clone(&started);
            async move {
                *started.lock() = true;
                "second"
            }
        }));
        assert_pending!(second.poll());
        assert!(!*started.lock());
        assert_eq!(queue.pending(), 2);

        release_tx.send(()).expect("release");
        assert_eq!(assert_ready!(first.poll()), "first");
        assert!(second.is_woken());
        assert_eq!(assert_ready!(second.poll()), "second");
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_dropped_waiter_gives_up_turn() {
        let queue = TaskQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let mut first = task::spawn(queue.post(async move {
            let _ = release_rx.await;
        }));
        assert_pending!(first.poll());

        let mut abandoned = task::spawn(queue.post(async {}));
        assert_pending!(abandoned.poll());
        drop(abandoned);
        assert_eq!(queue.pending(), 1);

        release_tx.send(()).expect("release");
        assert_ready!(first.poll());
        queue.post(async {}).await;
        assert_eq!(queue.pending(), 0);
    }
}
