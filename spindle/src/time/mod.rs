//! Timed wake-ups.

mod timer;
pub(crate) use timer::Timer;

use crate::runtime::context;
use std::time::Duration;

/// Put the caller to sleep for `duration`.
///
/// Inside a task this parks the task with the runtime's timer service and
/// yields the worker, so other tasks keep running in the meantime. Outside a
/// task (or after the owning runtime has shut down) it simply blocks the
/// calling thread.
pub fn sleep(duration: Duration) {
    if let Some(task) = context::current_task() {
        let Some(shared) = task.scheduler() else {
            std::thread::sleep(duration);
            return;
        };
        // Park with the timer first; only then yield.
        shared.timer.add_sleep(duration, task);
        context::preempt_current();
    } else {
        std::thread::sleep(duration);
    }
}
