use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded worker pool (the goroutine-pool equivalent, §5): `max_workers`
/// tasks draw from a bounded `queue_size` channel. Submission blocks the
/// caller when the queue is full — that blocking *is* the backpressure.
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    _workers: Vec<JoinHandle<()>>,
    limiter: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let limiter = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut workers = Vec::with_capacity(max_workers.max(1));
        for id in 0..max_workers.max(1) {
            let rx = rx.clone();
            let limiter = limiter.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match job {
                        Some(job) => {
                            let _permit = limiter.acquire().await;
                            job();
                        }
                        None => {
                            warn!("worker {id} shutting down: queue closed");
                            break;
                        }
                    }
                }
            }));
        }
        Self {
            tx,
            _workers: workers,
            limiter,
        }
    }

    /// Submits a job, blocking the caller if the bounded queue is full.
    pub async fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), crate::error::CoreError> {
        self.tx
            .send(Box::new(job))
            .await
            .map_err(|_| crate::error::CoreError::PoolClosed)
    }

    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = WorkerPool::new(2, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
