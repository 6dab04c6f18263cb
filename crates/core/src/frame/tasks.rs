//! Deferred work for the frame thread
//!
//! Runtime calls made off the render thread need their own runtime
//! attachment and race the game's own mutations. Workers instead hand a
//! closure to [`queue_task`]; the next [`super::on_frame`] runs it on the
//! thread the host renders from, which the runtime already knows.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::LazyLock;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Work deferred to the frame thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pending tasks held at once; also the most drained in one frame
const PENDING_LIMIT: usize = 1024;

/// Why a task was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Frame task queue is full")]
    Full,
    #[error("Frame task queue is closed")]
    Disconnected,
}

static PENDING: LazyLock<(Sender<Task>, Receiver<Task>)> =
    LazyLock::new(|| bounded(PENDING_LIMIT));

/// Defer `task` to the next frame
///
/// Never blocks; a full queue rejects the task.
#[tracing::instrument(skip(task))]
pub fn queue_task<F>(task: F) -> Result<(), QueueError>
where
    F: FnOnce() + Send + 'static,
{
    PENDING.0.try_send(Box::new(task)).map_err(|e| match e {
        TrySendError::Full(_) => {
            tracing::warn!("Frame task rejected, {} already pending", PENDING_LIMIT);
            QueueError::Full
        }
        TrySendError::Disconnected(_) => QueueError::Disconnected,
    })
}

/// Run what was pending when the frame started
///
/// Tasks queued while draining wait for the next frame. A panicking task is
/// logged and skipped. Returns the number of tasks run.
pub(crate) fn process_queued_tasks() -> usize {
    let due = PENDING.1.len().min(PENDING_LIMIT);
    let mut ran = 0;
    for task in PENDING.1.try_iter().take(due) {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!("Frame task panicked");
        }
        ran += 1;
    }
    ran
}

/// Tasks waiting for the next frame
pub fn queued_task_count() -> usize {
    PENDING.1.len()
}
