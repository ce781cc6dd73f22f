// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed-size worker pool — an explicit task queue drained by OS threads.
//
// Every submitted task gets its own single-slot result channel; the caller
// keeps the receiving end as a `TaskHandle`. Workers share nothing but the
// queue.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use scanprep_core::error::{Result, ScanprepError};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded pool of worker threads.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver: Receiver<Job> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("scanprep-worker-{id}"))
                .spawn(move || worker_loop(id, receiver))?;
            workers.push(handle);
        }
        debug!(size, "Worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Half the available parallelism, never less than one.
    pub fn default_size() -> usize {
        thread::available_parallelism()
            .map(|n| n.get() / 2)
            .unwrap_or(1)
            .max(1)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `task` and return a handle to its result.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let job: Job = Box::new(move || {
            // The submitter may have stopped waiting; the result is dropped.
            let _ = result_tx.send(task());
        });
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ScanprepError::PoolClosed("pool is shutting down".into()))?;
        sender
            .send(job)
            .map_err(|_| ScanprepError::PoolClosed("all workers have exited".into()))?;
        Ok(TaskHandle {
            receiver: result_rx,
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets each worker finish its backlog and exit.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread exited abnormally");
            }
        }
    }
}

fn worker_loop(id: usize, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        // A panicking task drops its result sender; the waiter sees that as
        // a failed task while this worker keeps serving the queue.
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(worker = id, "Task panicked");
        }
    }
    debug!(worker = id, "Worker exiting");
}

/// Receiving end of one task's result channel.
pub struct TaskHandle<R> {
    receiver: Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Block until the task finishes.
    pub fn wait(self) -> Result<R> {
        self.receiver.recv().map_err(|_| {
            ScanprepError::TaskPanicked("task ended without producing a result".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn results_come_back_per_task() {
        let pool = WorkerPool::new(3).unwrap();
        let handles: Vec<_> = (0..20u64)
            .map(|i| pool.submit(move || i * i).unwrap())
            .collect();
        let results: Vec<u64> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..20u64).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_task_does_not_take_the_pool_down() {
        let pool = WorkerPool::new(1).unwrap();
        let bad = pool.submit(|| -> u32 { panic!("page exploded") }).unwrap();
        assert!(matches!(bad.wait(), Err(ScanprepError::TaskPanicked(_))));

        let good = pool.submit(|| 7u32).unwrap();
        assert_eq!(good.wait().unwrap(), 7);
    }

    #[test]
    fn drop_drains_the_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2).unwrap();
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                let _ = pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn size_is_at_least_one() {
        assert!(WorkerPool::default_size() >= 1);
        assert_eq!(WorkerPool::new(0).unwrap().size(), 1);
    }
}
