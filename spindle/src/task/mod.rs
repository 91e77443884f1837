//! The unit of scheduled work.
//!
//! A [`Task`] wraps a one-shot body with the state a cooperative scheduler
//! needs: an atomic lifecycle word, a lazily created fiber, completion
//! signalling for thread-blocking waiters, an optional dependent task to
//! resume on completion, and a single-winner disposal token.

mod handle;
mod state;

pub use handle::TaskHandle;
pub(crate) use state::{State, TransitionToNotified};

use crate::fiber::{self, Fiber};
use crate::runtime::Shared;
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// Completion record, guarded by one mutex together with the dependent slot.
#[derive(Default)]
struct Completion {
    complete: bool,
    dependent: Option<Arc<Task>>,
}

pub(crate) struct Task {
    name: String,

    /// Atomic scheduler state word.
    state: State,

    /// Back-reference so channel and timer wake-ups can re-admit the task
    /// from any thread. Weak: the run queue owns tasks, not the reverse.
    sched: Weak<Shared>,

    /// Consumed exactly once by the fiber trampoline.
    body: Mutex<Option<TaskBody>>,

    /// Created lazily on first dispatch; non-empty from then on until the
    /// disposal loser releases it.
    fiber: Mutex<Option<Fiber>>,

    completion: Mutex<Completion>,
    waiters: Condvar,

    deletion: AtomicBool,
}

impl Task {
    pub(crate) fn new(name: String, sched: Weak<Shared>, body: TaskBody) -> Arc<Task> {
        Arc::new(Task {
            name,
            state: State::new(),
            sched,
            body: Mutex::new(Some(body)),
            fiber: Mutex::new(None),
            completion: Mutex::new(Completion::default()),
            waiters: Condvar::new(),
            deletion: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> &State {
        &self.state
    }

    /// Run the body, then publish completion under the task mutex and notify
    /// thread-blocking waiters. Called exactly once, from the trampoline.
    pub(crate) fn execute(&self) {
        let body = self
            .body
            .lock()
            .take()
            .expect("task body executed more than once");
        body();

        let mut completion = self.completion.lock();
        debug_assert!(!completion.complete);
        completion.complete = true;
        drop(completion);
        self.waiters.notify_all();
    }

    /// Block the calling *thread* (not fiber) until the task completes.
    pub(crate) fn wait(&self) {
        let mut completion = self.completion.lock();
        while !completion.complete {
            self.waiters.wait(&mut completion);
        }
    }

    /// Register `dep` to be resumed when this task completes. Fails once the
    /// task has completed, or when another task already claimed the slot;
    /// the caller then falls back to a thread-blocking [`wait`](Self::wait).
    pub(crate) fn set_dependent(&self, dep: Arc<Task>) -> bool {
        let mut completion = self.completion.lock();
        if completion.complete || completion.dependent.is_some() {
            return false;
        }
        completion.dependent = Some(dep);
        true
    }

    pub(crate) fn take_dependent(&self) -> Option<Arc<Task>> {
        self.completion.lock().dependent.take()
    }

    /// Single-winner disposal token: true for exactly one caller. The party
    /// that instead observes `false` arrived second, so the fiber can no
    /// longer be executing, and it performs the release.
    pub(crate) fn mark_for_deletion(&self) -> bool {
        !self.deletion.swap(true, Ordering::AcqRel)
    }

    /// Free the fiber stack early. Memory ownership of the task itself stays
    /// with its remaining `Arc` holders.
    pub(crate) fn release(&self) {
        if self.fiber.lock().take().is_some() {
            tracing::debug!(task = self.name(), "released fiber");
        }
    }

    /// Create the fiber on first dispatch.
    pub(crate) fn ensure_fiber(&self, stack_size: usize, entry: fiber::Entry) -> Result<()> {
        let mut slot = self.fiber.lock();
        if slot.is_none() {
            *slot = Some(Fiber::new(stack_size, entry, std::ptr::null_mut())?);
        }
        Ok(())
    }

    /// Pointer to the fiber's saved context, valid until release. Callers
    /// drop the internal guard before switching.
    pub(crate) fn fiber_context(&self) -> Option<*mut fiber::Context> {
        self.fiber.lock().as_ref().map(|f| f.context_ptr())
    }

    pub(crate) fn scheduler(&self) -> Option<Arc<Shared>> {
        self.sched.upgrade()
    }

    /// Re-admit this task after a wake-up (channel, timer, dependent). A
    /// no-op once the runtime is gone or the task is already queued/complete.
    pub(crate) fn wake(self: &Arc<Self>) {
        if let Some(shared) = self.sched.upgrade() {
            shared.wake(self.clone());
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
