use crate::runtime::context;
use crate::task::Task;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// An owned claim on a spawned task's completion and return value.
///
/// This is the task-world counterpart of [`std::thread::JoinHandle`]: the
/// task starts running as soon as it is spawned, whether or not the handle
/// is ever consulted. Waiting through the handle is task-aware: called from
/// inside another task it parks that task as a dependent of the target
/// (yielding its worker) instead of blocking the worker thread.
///
/// Dropping the handle waits for the task to complete and then races the
/// scheduler for the final release of the task's resources, so a handle
/// also acts as a join point: a task that never completes will block the
/// dropping thread forever.
pub struct TaskHandle<R> {
    task: Arc<Task>,
    result: Arc<Mutex<Option<R>>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(task: Arc<Task>, result: Arc<Mutex<Option<R>>>) -> TaskHandle<R> {
        TaskHandle { task, result }
    }

    /// The name the task was spawned with.
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Whether the task body has returned.
    pub fn is_finished(&self) -> bool {
        self.task.state().is_complete()
    }

    /// Block until the task completes.
    ///
    /// Inside a task this first parks the calling task as a dependent of the
    /// target, handing the worker back to the scheduler; the follow-up
    /// thread-level wait then returns immediately. Outside a task it blocks
    /// the calling thread.
    pub fn wait(&self) {
        context::preempt_for_dependent(&self.task);
        self.task.wait();
    }

    /// Wait for completion and take the task's return value.
    ///
    /// # Panics
    ///
    /// Panics if the value was already taken by an earlier `join` on a clone
    /// of the result slot.
    pub fn join(self) -> R {
        self.wait();
        self.result
            .lock()
            .take()
            .expect("task result already taken")
    }
}

impl<R> Drop for TaskHandle<R> {
    fn drop(&mut self) {
        context::preempt_for_dependent(&self.task);
        self.task.wait();
        // Second observer performs the release; by then the fiber cannot be
        // executing anywhere.
        if !self.task.mark_for_deletion() {
            self.task.release();
        }
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task", &self.task.name())
            .field("finished", &self.is_finished())
            .finish()
    }
}
