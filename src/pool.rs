//! Bounded worker pool.
//!
//! A fixed set of threads drains a bounded FIFO queue. The queue lives under
//! a mutex; a condition variable wakes one idle worker per enqueued job.
//! [`ThreadPool::submit`] never waits for space: a full queue hands the job
//! straight back so the reactor thread can apply back-pressure itself.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while constructing the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one thread")]
    NoThreads,
    #[error("worker pool queue capacity must be positive")]
    NoCapacity,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// A job the pool refused because its queue was full or shutting down.
pub struct Rejected<T>(pub T);

impl<T> Rejected<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rejected(..)")
    }
}

struct Queue<T> {
    jobs: VecDeque<T>,
    shutdown: bool,
}

struct Shared<T> {
    queue: Mutex<Queue<T>>,
    available: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size pool running `handler` on every submitted job.
pub struct ThreadPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Spawns `threads` workers sharing a queue of at most `max_requests`
    /// pending jobs.
    pub fn new<F>(threads: usize, max_requests: usize, handler: F) -> Result<Self, PoolError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if threads == 0 {
            return Err(PoolError::NoThreads);
        }
        if max_requests == 0 {
            return Err(PoolError::NoCapacity);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::with_capacity(max_requests.min(1024)),
                shutdown: false,
            }),
            available: Condvar::new(),
        });
        let handler = Arc::new(handler);

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
            capacity: max_requests,
        };

        for id in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let handler = Arc::clone(&handler);
            // On spawn failure `pool` drops here and joins what already started.
            let handle = thread::Builder::new()
                .name(format!("halfsync-worker-{id}"))
                .spawn(move || worker_loop(id, &shared, &*handler))?;
            pool.workers.push(handle);
        }

        debug!(threads, max_requests, "worker pool started");
        Ok(pool)
    }

    /// Enqueues a job without waiting for queue space.
    pub fn submit(&self, job: T) -> Result<(), Rejected<T>> {
        let mut queue = self.shared.lock();
        if queue.shutdown || queue.jobs.len() >= self.capacity {
            return Err(Rejected(job));
        }
        queue.jobs.push_back(job);
        drop(queue);

        self.shared.available.notify_one();
        Ok(())
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refuses new jobs, lets workers drain the queue, and joins them.
    pub fn shutdown(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.available.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked outside a job");
            }
        }
    }
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<T, F>(id: usize, shared: &Shared<T>, handler: &F)
where
    F: Fn(T),
{
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutdown {
                    debug!(worker = id, "worker exiting");
                    return;
                }
                // Spurious wake-ups land back here with an empty queue.
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(|| handler(job))).is_err() {
            error!(worker = id, "job panicked");
        }
    }
}
