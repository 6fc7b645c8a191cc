//! The task queue and its scheduling loops.
//!
//! A [`Queue`] owns a FIFO of pending tasks and a parking lot for idle
//! workers. It owns no threads of its own: callers bring their own, each
//! running [`work_forever`](Queue::work_forever), and any thread (including
//! the spawning one) may pull and execute work.
//!
//! # Design
//!
//! - **No polling**: idle workers park and are woken exactly when a task is
//!   pushed or the queue closes.
//! - **Work-stealing-free**: one FIFO per queue, FIFO order per queue modulo
//!   concurrent pull winners, no cross-queue traffic.
//! - **Active waits**: a thread waiting on a job keeps executing queued
//!   tasks instead of going idle, and parks on the queue's lot and the
//!   job's lot simultaneously when there is nothing to do.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::context::Context;
use crate::core::error::SpawnError;
use crate::core::fifo::ConcurrentQueue;
use crate::core::job::{Job, JobInner};
use crate::core::task::Task;
use crate::delegate::{Delegate, IntoDelegate};
use crate::park::ParkingLot;

/// A task queue with parked-worker wakeup and job grouping.
///
/// The handle is move-only; dropping it closes the queue and drains any
/// remaining work. Share it across worker threads by reference.
///
/// # Examples
///
/// ```
/// use taskpark::Queue;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let queue = Queue::new();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..4 {
///     let counter = Arc::clone(&counter);
///     queue
///         .spawn_task(move || {
///             counter.fetch_add(1, Ordering::Relaxed);
///         })
///         .unwrap();
/// }
///
/// queue.work_all();
/// assert_eq!(counter.load(Ordering::Relaxed), 4);
/// ```
pub struct Queue {
    tasks: ConcurrentQueue<Box<Task>>,
    lot: ParkingLot,
    closed: AtomicBool,
}

impl Queue {
    /// Creates an open queue with no pending tasks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: ConcurrentQueue::new(),
            lot: ParkingLot::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Spawns a parentless task on this queue and wakes one idle worker.
    ///
    /// # Errors
    ///
    /// - [`SpawnError::EmptyFunction`] if `work` holds no callable.
    /// - [`SpawnError::QueueFull`] if the queue has been closed.
    pub fn spawn_task<M>(&self, work: impl IntoDelegate<M>) -> Result<(), SpawnError> {
        self.spawn_with_parent(work.into_delegate(), None)
    }

    pub(crate) fn spawn_with_parent(
        &self,
        work: Delegate,
        parent: Option<NonNull<JobInner>>,
    ) -> Result<(), SpawnError> {
        if work.is_empty() {
            return Err(SpawnError::EmptyFunction);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(SpawnError::QueueFull);
        }

        if let Some(job) = parent {
            // the caller's context keeps the job alive across this call;
            // from here on the task set's collective reference does
            unsafe { job.as_ref().add_task() };
        }

        self.tasks.push_back(Task::new(work, parent));
        self.lot.unpark_one();
        trace!(parented = parent.is_some(), "task spawned");
        Ok(())
    }

    /// Creates a job and runs `initializer` synchronously on the calling
    /// thread with a context that parents every spawn to the new job.
    ///
    /// The initializer itself is not a task; its spawns behave exactly like
    /// top-level spawns apart from the parent binding.
    pub fn create_job(&self, initializer: impl FnOnce(&mut Context<'_>)) -> Job {
        let inner = Arc::new(JobInner::new());
        let mut ctx = Context::new(self, Some(NonNull::from(&*inner)));
        initializer(&mut ctx);
        trace!("job created");
        Job::from_inner(inner)
    }

    /// Pulls and executes at most one task. Returns whether work was done.
    pub fn work_one(&self) -> bool {
        match self.tasks.pop_front() {
            Some(task) => {
                self.execute(task);
                true
            }
            None => false,
        }
    }

    /// Executes tasks until the queue reads empty. Never blocks.
    pub fn work_all(&self) {
        while self.work_one() {}
    }

    /// Worker loop: executes tasks, parking while the queue is empty, until
    /// the queue is closed.
    ///
    /// Any number of threads may run this concurrently on one queue.
    pub fn work_forever(&self) {
        debug!("worker entering scheduling loop");
        loop {
            self.work_all();
            if self.closed.load(Ordering::Acquire) {
                break;
            }

            let mut pulled = None;
            self.lot.park_until(|| {
                self.closed.load(Ordering::Acquire) || {
                    pulled = self.tasks.pop_front();
                    pulled.is_some()
                }
            });
            if let Some(task) = pulled {
                self.execute(task);
            }
        }
        debug!("worker released by close");
    }

    /// Blocks until `job` completes, executing tasks from this queue while
    /// waiting.
    ///
    /// When there is nothing to execute, the thread parks on this queue's
    /// lot and the job's lot simultaneously, so it wakes for whichever
    /// happens first: new local work, or the job completing (possibly on a
    /// different queue's workers).
    pub fn wait_job_actively(&self, job: &Job) {
        let Some(awaited) = job.inner() else {
            return;
        };

        while !awaited.complete() {
            if !self.tasks.maybe_empty() && self.work_one() {
                continue;
            }

            let mut pulled = None;
            self.lot.park_until_either(&awaited.waiting, || {
                awaited.complete() || {
                    pulled = self.tasks.pop_front();
                    pulled.is_some()
                }
            });
            if let Some(task) = pulled {
                self.execute(task);
            }
        }
    }

    /// Closes the queue: drains pending work, rejects further spawns, and
    /// releases every worker parked in [`work_forever`](Self::work_forever).
    ///
    /// Closing an already-closed queue is a no-op.
    pub fn close(&self) {
        self.work_all();
        self.closed.store(true, Ordering::Release);
        self.lot.unpark_all();
        // a spawn may have slipped in between the drain and the flag store
        self.work_all();
        debug!("queue closed");
    }

    fn execute(&self, task: Box<Task>) {
        let Task { work, parent } = *task;
        // completion accounting runs on drop, so a panicking task still
        // decrements its job before the unwind continues; losing the
        // decrement would wedge the job forever
        let _completion = CompletionGuard { parent };
        let mut ctx = Context::new(self, parent);
        work.invoke(&mut ctx);
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

struct CompletionGuard {
    parent: Option<NonNull<JobInner>>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(job) = self.parent {
            unsafe { JobInner::complete_task(job) };
        }
    }
}
