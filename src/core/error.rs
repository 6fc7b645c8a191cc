//! Error types for scheduler operations.

use thiserror::Error;

/// Errors reported when submitting work to a queue.
///
/// All failures are reported at spawn time as return values; nothing is
/// signalled out of band and a task, once queued, always executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The delegate held no callable.
    #[error("delegate holds no callable")]
    EmptyFunction,
    /// The queue is closed (or at capacity) and not accepting tasks.
    #[error("queue is not accepting tasks")]
    QueueFull,
}
