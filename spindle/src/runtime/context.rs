//! Per-thread execution context.
//!
//! Every worker thread records here which task is currently mounted on it
//! and where its own (thread-adopted) fiber lives, so suspension points can
//! find both sides of a switch. Threads that never ran a worker loop have no
//! context; task-aware entry points fall back to thread-blocking behavior.

use crate::fiber::{self, Fiber};
use crate::task::Task;
use std::cell::RefCell;
use std::sync::Arc;

pub(crate) struct WorkerContext {
    /// Adopts the worker's own call stack; the switch target for every
    /// suspension and completion.
    thread_fiber: Fiber,

    current_task: Option<Arc<Task>>,
}

thread_local! {
    static CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

pub(crate) fn init() {
    CONTEXT.with(|cell| {
        let mut ctx = cell.borrow_mut();
        debug_assert!(ctx.is_none(), "worker context initialized twice");
        *ctx = Some(WorkerContext {
            thread_fiber: Fiber::from_thread(),
            current_task: None,
        });
    });
}

/// Tear down on worker exit; drops the thread-adopted fiber handle without
/// touching the thread's stack.
pub(crate) fn clear() {
    CONTEXT.with(|cell| cell.borrow_mut().take());
}

/// The task mounted on the calling worker, or `None` when the caller is not
/// inside a task.
pub(crate) fn current_task() -> Option<Arc<Task>> {
    CONTEXT.with(|cell| {
        cell.borrow()
            .as_ref()
            .and_then(|ctx| ctx.current_task.clone())
    })
}

pub(crate) fn set_current_task(task: Option<Arc<Task>>) -> Option<Arc<Task>> {
    CONTEXT.with(|cell| {
        let mut ctx = cell.borrow_mut();
        let ctx = ctx.as_mut().expect("not on a worker thread");
        std::mem::replace(&mut ctx.current_task, task)
    })
}

pub(crate) fn thread_fiber_context() -> *mut fiber::Context {
    CONTEXT.with(|cell| {
        cell.borrow()
            .as_ref()
            .expect("not on a worker thread")
            .thread_fiber
            .context_ptr()
    })
}

/// Suspend the current task and hand control back to the worker loop.
///
/// Suspension is a two-step dance: the caller records the task on whatever
/// wait-queue will wake it *before* calling this, and this function only
/// yields. It returns when the task is next dispatched, possibly on a
/// different worker.
pub(crate) fn preempt_current() {
    let (task_ctx, thread_ctx) = CONTEXT.with(|cell| {
        let ctx = cell.borrow();
        let ctx = ctx.as_ref().expect("preempt_current outside a worker thread");
        let task = ctx
            .current_task
            .as_ref()
            .expect("preempt_current outside a task");
        let task_ctx = task.fiber_context().expect("mounted task has no fiber");
        (task_ctx, ctx.thread_fiber.context_ptr())
    });

    // The TLS borrow is released above; no lock is held across the switch.
    unsafe { fiber::switch(task_ctx, thread_ctx) };
}

/// Park the current task as a dependent of `target`, then suspend.
///
/// Returns immediately when called outside a task, when `target` has
/// already completed, or when its dependent slot is taken; callers then
/// fall back to a thread-blocking wait.
pub(crate) fn preempt_for_dependent(target: &Arc<Task>) {
    let Some(current) = current_task() else {
        return;
    };
    if Arc::ptr_eq(&current, target) {
        return;
    }
    if target.set_dependent(current) {
        preempt_current();
    }
}
