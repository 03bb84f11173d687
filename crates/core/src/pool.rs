//! Fixed-size worker pool over one FIFO queue.
//!
//! N workers drain a shared unbounded channel; `enqueue` never blocks. On
//! shutdown the queue is closed and workers finish everything already
//! accepted before exiting. Tasks are futures; a worker runs one at a time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct WorkerPool {
    tx: Option<mpsc::UnboundedSender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|worker_id| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the lock only while dequeuing so siblings can
                        // pull work while this task runs.
                        let task = { rx.lock().await.recv().await };
                        match task {
                            Some(task) => task.await,
                            None => break,
                        }
                    }
                    debug!(worker_id, "worker drained and exiting");
                })
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Queue a task; never blocks, never drops while the pool is open.
    pub fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::pin(task));
        }
    }

    /// Close the queue and wait for every accepted task to finish.
    pub async fn shutdown(mut self) {
        self.tx.take(); // close the channel
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn executes_every_accepted_task() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.enqueue(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn zero_size_is_clamped_to_one() {
        let pool = WorkerPool::new(0);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        pool.enqueue(async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_slow_tasks() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = counter.clone();
            pool.enqueue(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
