//! Spawn contexts: the queue/job binding handed to running callables.

use std::ptr::NonNull;

use crate::core::error::SpawnError;
use crate::core::job::JobInner;
use crate::core::queue::Queue;
use crate::delegate::IntoDelegate;

/// A borrowed binding of a queue and an optional parent job, passed to job
/// initializers and to every executing task.
///
/// Work spawned through a context joins the bound job (if any) and lands on
/// the bound queue. The lifetime parameter ties a context to its originating
/// call; it cannot be stored beyond it.
pub struct Context<'q> {
    queue: &'q Queue,
    parent: Option<NonNull<JobInner>>,
}

impl<'q> Context<'q> {
    pub(crate) fn new(queue: &'q Queue, parent: Option<NonNull<JobInner>>) -> Self {
        Self { queue, parent }
    }

    /// Spawns `work` on the bound queue, parented to the bound job.
    ///
    /// # Errors
    ///
    /// - [`SpawnError::EmptyFunction`] if `work` holds no callable.
    /// - [`SpawnError::QueueFull`] if the queue has been closed.
    pub fn spawn_task<M>(&self, work: impl IntoDelegate<M>) -> Result<(), SpawnError> {
        self.queue.spawn_with_parent(work.into_delegate(), self.parent)
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("parented", &self.parent.is_some())
            .finish()
    }
}
