use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use halfsync::pool::{PoolError, ThreadPool};

#[test]
fn test_pool_rejects_zero_threads() {
    let result = ThreadPool::new(0, 10, |_: u32| {});
    assert!(matches!(result, Err(PoolError::NoThreads)));
}

#[test]
fn test_pool_rejects_zero_capacity() {
    let result = ThreadPool::new(2, 0, |_: u32| {});
    assert!(matches!(result, Err(PoolError::NoCapacity)));
}

#[test]
fn test_pool_runs_every_job() {
    let sum = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sum);
    let mut pool = ThreadPool::new(4, 1000, move |n: usize| {
        counter.fetch_add(n, Ordering::SeqCst);
    })
    .unwrap();

    for n in 1..=100 {
        pool.submit(n).unwrap();
    }
    pool.shutdown();

    assert_eq!(sum.load(Ordering::SeqCst), 5050);
}

#[test]
fn test_submit_does_not_block_when_full() {
    let (started_tx, started_rx) = mpsc::channel();
    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock().unwrap();

    let worker_gate = Arc::clone(&gate);
    let pool = ThreadPool::new(1, 2, move |job: u32| {
        started_tx.send(job).unwrap();
        let _pass = worker_gate.lock().unwrap();
    })
    .unwrap();

    // The single worker picks up job 0 and blocks on the gate.
    pool.submit(0).unwrap();
    assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);

    pool.submit(1).unwrap();
    pool.submit(2).unwrap();
    assert_eq!(pool.queued(), 2);

    let rejected = pool.submit(3).unwrap_err();
    assert_eq!(rejected.into_inner(), 3);

    drop(held);
    drop(pool);
}

#[test]
fn test_concurrent_submitters_lose_and_duplicate_nothing() {
    const SUBMITTERS: usize = 8;
    const PER_SUBMITTER: usize = 500;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut pool = ThreadPool::new(4, 64, move |job: usize| {
        sink.lock().unwrap().push(job);
    })
    .unwrap();
    let pool_ref = &pool;

    let barrier = Barrier::new(SUBMITTERS);
    let accepted: Vec<usize> = thread::scope(|scope| {
        let handles: Vec<_> = (0..SUBMITTERS)
            .map(|id| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let mut accepted = Vec::new();
                    for i in 0..PER_SUBMITTER {
                        let job = id * PER_SUBMITTER + i;
                        if pool_ref.submit(job).is_ok() {
                            accepted.push(job);
                        }
                    }
                    accepted
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    pool.shutdown();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), accepted.len());
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(unique, accepted.into_iter().collect::<HashSet<_>>());
}

#[test]
fn test_panicking_job_does_not_kill_worker() {
    let done = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done);
    let mut pool = ThreadPool::new(1, 10, move |job: u32| {
        if job == 0 {
            panic!("job failure");
        }
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.submit(0).unwrap();
    pool.submit(1).unwrap();
    pool.submit(2).unwrap();
    pool.shutdown();

    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(pool.threads(), 0);
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let mut pool = ThreadPool::new(1, 10, |_: u32| {}).unwrap();
    pool.shutdown();
    assert!(pool.submit(1).is_err());
}
