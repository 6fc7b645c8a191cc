//! Task records: one unit of packaged work plus its optional parent job.

use std::ptr::NonNull;

use crate::core::job::JobInner;
use crate::delegate::Delegate;

/// A spawned unit of work. Immutable after construction; ownership moves
/// caller -> queue -> executor, and the record is destroyed right after it
/// runs.
pub(crate) struct Task {
    pub(crate) work: Delegate,
    pub(crate) parent: Option<NonNull<JobInner>>,
}

// The parent pointer is non-owning, but the first-task-adds-a-reference /
// last-task-drops-it discipline guarantees the job outlives every task that
// points at it.
unsafe impl Send for Task {}

impl Task {
    pub(crate) fn new(work: Delegate, parent: Option<NonNull<JobInner>>) -> Box<Self> {
        Box::new(Self { work, parent })
    }
}
