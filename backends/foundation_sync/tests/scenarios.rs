//! End-to-end scenarios exercising each primitive the way its callers do.

use foundation_sync::{
    BoundedBlockingQueue, CacheStats, MemoCache, NonReentrantLock, SequentialBarrier, WaitConfig,
};
use serial_test::serial;
use std::cell::UnsafeCell;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

/// Plain counter whose only protection is the `NonReentrantLock` under test.
struct Unguarded(UnsafeCell<i64>);

// SAFETY: every access in these tests happens while holding the lock.
unsafe impl Sync for Unguarded {}

#[test]
#[ntest::timeout(10000)]
fn scenario_a_full_queue_blocks_third_enqueue() {
    let queue = BoundedBlockingQueue::new(2).unwrap();
    let (progress, enqueued) = mpsc::channel::<u32>();

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for item in 1..=3 {
                queue.enqueue(item);
                progress.send(item).expect("should report progress");
            }
        })
    };

    assert_eq!(enqueued.recv().unwrap(), 1);
    assert_eq!(enqueued.recv().unwrap(), 2);

    // third enqueue is blocked on a full queue
    assert!(enqueued.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(queue.len(), 2);

    assert_eq!(queue.dequeue(), 1);
    assert_eq!(enqueued.recv().unwrap(), 3);
    producer.join().expect("producer should not panic");

    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || vec![queue.dequeue(), queue.dequeue()])
    };
    assert_eq!(consumer.join().unwrap(), vec![2, 3]);
    assert!(queue.is_empty());
}

#[test]
#[serial]
#[ntest::timeout(10000)]
fn scenario_b_fifty_callers_share_one_computation() {
    let cache: MemoCache<&'static str, u64> = MemoCache::new();
    let invocations = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let cache = cache.clone();
            let invocations = Arc::clone(&invocations);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                cache.get_or_compute("x", || {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    Ok::<_, Infallible>(42)
                })
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 42);
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(
        stats,
        CacheStats {
            hits: 49,
            misses: 1,
            evictions: 0
        }
    );
    assert!((stats.ratio() - 0.98).abs() < 1e-9);
}

#[test]
#[ntest::timeout(30000)]
fn scenario_c_lock_keeps_counter_balanced() {
    let lock = NonReentrantLock::new();
    let counter = Arc::new(Unguarded(UnsafeCell::new(0)));

    let workers: Vec<_> = [1i64, -1]
        .into_iter()
        .map(|delta| {
            let lock = lock.clone();
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    lock.acquire();
                    // SAFETY: the lock is held.
                    unsafe { *counter.0.get() += delta };
                    lock.release();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker should not panic");
    }

    lock.acquire();
    // SAFETY: the lock is held.
    assert_eq!(unsafe { *counter.0.get() }, 0);
    lock.release();
}

#[test]
#[ntest::timeout(10000)]
fn scenario_d_reverse_start_with_staggered_delays() {
    let barrier = SequentialBarrier::new(3).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = [2usize, 1, 0]
        .into_iter()
        .enumerate()
        .map(|(launch, stage)| {
            thread::sleep(Duration::from_millis(10 * launch as u64));
            let barrier = barrier.clone();
            let order = Arc::clone(&order);
            thread::spawn(move || {
                barrier
                    .arrive_and_wait(stage, || order.lock().unwrap().push(stage))
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stage worker should not panic");
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(barrier.completed_stage(), Some(2));
}

#[test]
#[ntest::timeout(10000)]
fn single_producer_single_consumer_preserves_order() {
    let queue = BoundedBlockingQueue::new(3).unwrap();

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for item in 0..1_000u32 {
                queue.enqueue(item);
            }
        })
    };

    let mut received = Vec::with_capacity(1_000);
    for _ in 0..1_000 {
        received.push(queue.dequeue());
        assert!(queue.len() <= queue.capacity());
    }
    producer.join().expect("producer should not panic");

    assert_eq!(received, (0..1_000).collect::<Vec<_>>());
}

#[test]
#[ntest::timeout(10000)]
fn queue_as_handoff_between_acceptor_and_cached_workers() {
    let jobs = BoundedBlockingQueue::new(4).unwrap();
    let cache: MemoCache<u32, u64> = MemoCache::new();
    let lookups = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let jobs = jobs.clone();
            let cache = cache.clone();
            let lookups = Arc::clone(&lookups);
            thread::spawn(move || {
                let wait = WaitConfig::new().timeout(Duration::from_millis(200));
                let mut served = 0;
                while let Ok(key) = jobs.dequeue_with(&wait) {
                    let value = cache
                        .get_or_compute(key, || {
                            lookups.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, Infallible>(u64::from(key) * 2)
                        })
                        .unwrap();
                    assert_eq!(value, u64::from(key) * 2);
                    served += 1;
                }
                served
            })
        })
        .collect();

    for request in 0..60u32 {
        jobs.enqueue(request % 5);
    }

    let served: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(served, 60);
    assert_eq!(lookups.load(Ordering::SeqCst), 5);
    assert_eq!(cache.stats().misses, 5);
    assert_eq!(cache.stats().hits, 55);
}
