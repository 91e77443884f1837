use crate::fiber;
use crate::runtime::Shared;
use crate::runtime::context;
use crate::task::{Task, TransitionToNotified};
use crate::utils::ScopeGuard;
use crate::utils::thread::current_thread_name;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-worker record. The exit flag is consulted between dispatches, so a
/// worker asked to exit finishes its current task first.
pub(crate) struct Proc {
    force_exit: AtomicBool,
}

impl Proc {
    pub(crate) fn new() -> Proc {
        Proc {
            force_exit: AtomicBool::new(false),
        }
    }

    pub(crate) fn force_exit(&self) {
        self.force_exit.store(true, Ordering::Release);
    }

    pub(crate) fn should_exit(&self) -> bool {
        self.force_exit.load(Ordering::Acquire)
    }
}

pub(crate) fn main_loop(shared: Arc<Shared>, proc: Arc<Proc>) {
    context::init();
    let _teardown = ScopeGuard::new(context::clear);

    let worker = current_thread_name().unwrap_or_else(|_| "spindle-?".into());
    tracing::info!(worker = %worker, "worker thread started");

    while !proc.should_exit() {
        // A `None` sentinel only wakes us to re-check the exit flag.
        if let Some(task) = shared.queue.pop() {
            run_task(&shared, task, &worker);
        }
    }

    tracing::info!(worker = %worker, "worker thread exited");
}

/// Mount a task on this worker: lazily create its fiber, switch into it,
/// and classify how it came back.
fn run_task(shared: &Arc<Shared>, task: Arc<Task>, worker: &str) {
    if let Err(e) = task.ensure_fiber(shared.cfg.stack_size, trampoline) {
        panic!("failed to create fiber for task {:?}: {e:#}", task.name());
    }

    let previous = context::set_current_task(Some(task.clone()));
    debug_assert!(previous.is_none(), "worker mounted a task over another");
    task.state().transition_to_running();

    let thread_ctx = context::thread_fiber_context();
    let task_ctx = task.fiber_context().expect("fiber created above");
    // No lock is held across the switch.
    unsafe { fiber::switch(thread_ctx, task_ctx) };

    context::set_current_task(None);

    if task.state().is_complete() {
        tracing::info!(task = task.name(), worker = %worker, "task completed");

        // A task parked awaiting this one resumes right here, on this
        // worker. If it is still being switched out elsewhere, its own
        // worker re-queues it at unmount instead.
        if let Some(dep) = task.take_dependent() {
            match dep.state().transition_to_notified() {
                TransitionToNotified::Submit => run_task(shared, dep, worker),
                TransitionToNotified::Deferred | TransitionToNotified::NoOp => {}
            }
        }

        // Second observer of the deletion token releases the fiber.
        if !task.mark_for_deletion() {
            task.release();
        }
    } else {
        tracing::info!(task = task.name(), worker = %worker, "task paused");
        if task.state().transition_to_idle() {
            shared.queue.push(task);
        }
    }
}

/// First and only frame of every task fiber.
extern "C" fn trampoline(_arg: *mut ()) -> ! {
    let (task_ctx, thread_ctx);
    {
        let task = context::current_task().expect("fiber trampoline outside a worker");
        tracing::info!(task = task.name(), "executing task");
        task.execute();
        task.state().transition_to_complete();
        task_ctx = task.fiber_context().expect("completed task lost its fiber");
        thread_ctx = context::thread_fiber_context();
    }
    // The task reference is dropped; hand control back to the worker loop
    // for the completion path.
    unsafe { fiber::switch(task_ctx, thread_ctx) };
    unreachable!("completed fiber was resumed");
}
