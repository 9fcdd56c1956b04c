//! Bounded worker pool for background refreshes.
//!
//! Readers on the stale path hand a refresh job to this pool and return
//! immediately. The pool is deliberately lossy: a fixed number of workers
//! drain a bounded queue, and a job offered while the queue is full is
//! discarded, never queued unboundedly and never blocking the reader. A
//! dropped refresh is tolerable because the stale window keeps serving the
//! old value until a later read retries.
//!
//! The pool is constructed per cache (no process-wide ambient state) and
//! torn down with an idempotent [`RefreshPool::shutdown`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A queued refresh task.
pub type RefreshJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed-size worker pool with a bounded queue and discard-on-overflow.
pub struct RefreshPool {
    sender: Mutex<Option<mpsc::Sender<RefreshJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl RefreshPool {
    /// Spawn a pool with `workers` worker tasks and a queue of twice that.
    pub fn new(workers: usize) -> Self {
        let worker_count = workers.max(1);
        let (tx, rx) = mpsc::channel::<RefreshJob>(worker_count * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..worker_count)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        // The receiver lock is held only while waiting for
                        // the next job, so workers still run jobs in
                        // parallel.
                        let job = { rx.lock().await.recv().await };
                        match job {
                            Some(job) => job.await,
                            None => {
                                debug!(worker, "refresh worker stopping");
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            worker_count,
        }
    }

    /// The worker ceiling this pool was built with.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Offer a job to the pool.
    ///
    /// Returns `false` when the job was discarded: the queue is full, the
    /// pool is shut down, or the sender lock is poisoned. Callers treat a
    /// discard as "refresh skipped", never as an error.
    pub fn try_schedule(&self, job: RefreshJob) -> bool {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.try_send(job).is_ok(),
            None => false,
        }
    }

    /// Stop accepting work and wait (bounded) for in-flight jobs.
    ///
    /// Workers still running after `grace` are aborted. Idempotent: later
    /// calls return immediately.
    pub async fn shutdown(&self, grace: Duration) {
        if let Ok(mut guard) = self.sender.lock() {
            // Dropping the sender closes the queue; workers drain what is
            // left and stop.
            guard.take();
        }

        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        for mut handle in handles {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn counting_job(counter: Arc<AtomicUsize>, done: Arc<Notify>) -> RefreshJob {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            done.notify_one();
        })
    }

    #[tokio::test]
    async fn test_jobs_run() {
        let pool = RefreshPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());

        for _ in 0..3 {
            assert!(pool.try_schedule(counting_job(Arc::clone(&counter), Arc::clone(&done))));
            done.notified().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_saturation_discards_instead_of_blocking() {
        let pool = RefreshPool::new(1); // queue capacity 2
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        // Occupy the single worker until the gate opens.
        let blocker: RefreshJob = {
            let started = Arc::clone(&started);
            let gate = Arc::clone(&gate);
            Box::pin(async move {
                started.notify_one();
                gate.notified().await;
            })
        };
        assert!(pool.try_schedule(blocker));
        started.notified().await;

        // Fill the queue, then overflow it.
        assert!(pool.try_schedule(Box::pin(async {})));
        assert!(pool.try_schedule(Box::pin(async {})));
        assert!(!pool.try_schedule(Box::pin(async {})), "overflow must discard");

        gate.notify_one();
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work_and_is_idempotent() {
        let pool = RefreshPool::new(2);
        pool.shutdown(Duration::from_secs(1)).await;
        pool.shutdown(Duration::from_secs(1)).await;

        assert!(!pool.try_schedule(Box::pin(async {})));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_jobs() {
        let pool = RefreshPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        let slow: RefreshJob = {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert!(pool.try_schedule(slow));

        pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
