//! Jobs: aggregates whose completion is "all my tasks have executed".
//!
//! A job is shared between the external [`Job`] handles holding it and, while
//! any task remains outstanding, one collective reference held on behalf of
//! the whole task set. The collective reference is taken when the first task
//! is added and released when the last one completes; tasks themselves carry
//! only raw, non-owning parent pointers.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::park::ParkingLot;

/// Shared job state: the outstanding-task count plus the lot that threads
/// blocked in an active job wait park in. The reference count lives in the
/// strong count of the owning `Arc` allocation.
pub(crate) struct JobInner {
    tasks: AtomicUsize,
    pub(crate) waiting: ParkingLot,
}

impl JobInner {
    pub(crate) fn new() -> Self {
        Self {
            tasks: AtomicUsize::new(0),
            waiting: ParkingLot::new(),
        }
    }

    /// Whether every task added to this job has finished executing.
    pub(crate) fn complete(&self) -> bool {
        // pairs with the release decrement in `complete_task`, so a true
        // answer also publishes everything the tasks wrote
        self.tasks.load(Ordering::Acquire) == 0
    }

    /// Records one more outstanding task.
    ///
    /// # Safety
    ///
    /// `self` must live inside an `Arc<JobInner>` allocation; the first task
    /// takes the collective strong reference that keeps the job alive until
    /// the last task completes.
    pub(crate) unsafe fn add_task(&self) {
        if self.tasks.fetch_add(1, Ordering::AcqRel) == 0 {
            Arc::increment_strong_count(self as *const Self);
        }
    }

    /// Records one task as finished. On the last task this wakes every
    /// thread parked on the job's lot and releases the collective
    /// reference, which may destroy the job.
    ///
    /// # Safety
    ///
    /// `job` must point into a live `Arc<JobInner>` allocation whose
    /// collective task reference is still held.
    pub(crate) unsafe fn complete_task(job: NonNull<JobInner>) {
        let prior = job.as_ref().tasks.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prior > 0, "completed more tasks than were added");
        if prior == 1 {
            // waiters must be released before the collective reference is
            // dropped: after the decrement the allocation may be gone
            job.as_ref().waiting.unpark_all();
            Arc::decrement_strong_count(job.as_ptr().cast_const());
        }
    }
}

/// Shared-ownership handle to a job created by
/// [`Queue::create_job`](crate::Queue::create_job).
///
/// Cloning shares the job; dropping the last handle after the final task
/// completes destroys it. The default handle represents "no job" and is
/// always complete. A job whose tasks have all drained must not be used to
/// spawn further work; the API offers no way to do so.
#[derive(Clone, Default)]
pub struct Job {
    inner: Option<Arc<JobInner>>,
}

impl Job {
    pub(crate) fn from_inner(inner: Arc<JobInner>) -> Self {
        Self { inner: Some(inner) }
    }

    pub(crate) fn inner(&self) -> Option<&JobInner> {
        self.inner.as_deref()
    }

    /// Whether every task spawned into this job has finished executing.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.inner.as_deref().map_or(true, JobInner::complete)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("complete", &self.complete())
            .finish()
    }
}
