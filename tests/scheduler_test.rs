//! End-to-end scheduler tests.
//!
//! These validate:
//! 1. Nested spawns join their parent job and active waits drain them
//! 2. Many producers and workers agree on a shared counter
//! 3. Spawn failures are reported as values, never executed
//! 4. Close drains, rejects, and stays idempotent
//! 5. A single worker pulls in spawn order

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use taskpark::util::init_tracing;
use taskpark::{Context, Delegate, Queue, SpawnError};

#[test]
fn test_nested_spawn_under_job() {
    init_tracing();

    // repeat in hopes of shaking out scheduling races
    for _ in 0..10 {
        let queue = Queue::new();
        let num = Arc::new(AtomicU32::new(0x1337_C0DE));
        let num2 = Arc::new(AtomicU32::new(0x600D_F00D));

        let job = queue.create_job(|ctx| {
            // task with no context
            let num = Arc::clone(&num);
            ctx.spawn_task(move || {
                num.store(0xDEAD_BEEF, Ordering::Relaxed);
            })
            .unwrap();

            // task that spawns a follow-up into the same job
            let num2 = Arc::clone(&num2);
            ctx.spawn_task(move |ctx: &mut Context| {
                num2.store(0xDEAD_BEEE, Ordering::Relaxed);
                let num2 = Arc::clone(&num2);
                ctx.spawn_task(move || {
                    num2.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            })
            .unwrap();
        });

        queue.wait_job_actively(&job);
        assert!(job.complete());
        assert_eq!(num.load(Ordering::Relaxed), 0xDEAD_BEEF);
        assert_eq!(num2.load(Ordering::Relaxed), 0xDEAD_BEEF);
    }
}

#[test]
fn test_many_tasks_two_workers() {
    init_tracing();

    let queue = Queue::new();
    let counter = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| queue.work_forever());
        }

        for inc in 1..=4usize {
            for _ in 0..1000 {
                let counter = Arc::clone(&counter);
                queue
                    .spawn_task(move || {
                        counter.fetch_add(inc, Ordering::Relaxed);
                    })
                    .unwrap();
            }
        }

        // the main thread pitches in alongside the workers
        while counter.load(Ordering::Relaxed) != 10_000 {
            queue.work_all();
        }

        queue.close();
    });

    assert_eq!(counter.load(Ordering::Relaxed), 10_000);
}

#[test]
fn test_round_trip_counter() {
    let queue = Queue::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let n = 500;

    thread::scope(|s| {
        for _ in 0..3 {
            s.spawn(|| queue.work_forever());
        }

        let job = queue.create_job(|ctx| {
            for _ in 0..n {
                let counter = Arc::clone(&counter);
                ctx.spawn_task(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
        });

        queue.wait_job_actively(&job);
        assert!(job.complete());
        assert_eq!(counter.load(Ordering::Relaxed), n);

        queue.close();
    });
}

#[test]
fn test_spawn_on_closed_queue() {
    let queue = Queue::new();
    queue.close();

    let result = queue.spawn_task(|| {});
    assert_eq!(result, Err(SpawnError::QueueFull));
}

#[test]
fn test_empty_delegate_rejected() {
    let queue = Queue::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let result = queue.spawn_task(Delegate::new());
    assert_eq!(result, Err(SpawnError::EmptyFunction));

    queue.work_all();
    assert_eq!(counter.load(Ordering::Relaxed), 0);
}

#[test]
fn test_double_close_is_noop() {
    let queue = Queue::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&counter);
    queue
        .spawn_task(move || {
            c.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    queue.close();
    queue.close();

    assert_eq!(counter.load(Ordering::Relaxed), 1);
    assert_eq!(queue.spawn_task(|| {}), Err(SpawnError::QueueFull));
}

#[test]
fn test_single_worker_fifo_order() {
    let queue = Queue::new();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for i in 0..64 {
        let order = Arc::clone(&order);
        queue
            .spawn_task(move || {
                order.lock().push(i);
            })
            .unwrap();
    }

    queue.work_all();
    assert_eq!(*order.lock(), (0..64).collect::<Vec<_>>());
}

#[test]
fn test_job_handle_is_shareable() {
    let queue = Queue::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let job = queue.create_job(|ctx| {
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            ctx.spawn_task(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
    });

    let watcher = job.clone();
    thread::scope(|s| {
        s.spawn(move || {
            while !watcher.complete() {
                thread::yield_now();
            }
        });

        queue.wait_job_actively(&job);
    });

    assert_eq!(counter.load(Ordering::Relaxed), 8);
}
