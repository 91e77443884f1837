use std::sync::atomic::{AtomicU8, Ordering};

/// The task is in the run queue, or a wake-up arrived while it was mounted
/// and its worker will re-queue it at unmount. A set bit blocks further
/// submissions, so a task appears in the queue at most once.
const NOTIFIED: u8 = 0b001;

/// The task is mounted on a worker: its fiber is (about to be) executing.
const RUNNING: u8 = 0b010;

/// The task body returned. Terminal; no bit is ever set after this one.
const COMPLETE: u8 = 0b100;

/// Outcome of a wake-up attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToNotified {
    /// The caller must push the task onto the run queue.
    Submit,
    /// The task is still mounted on a worker; that worker observes the
    /// notification at unmount and re-queues the task itself.
    Deferred,
    /// Already queued, or complete. Nothing to do.
    NoOp,
}

/// Atomic scheduler state of a task.
///
/// Completion is the sole terminal state; "queued" and "mounted" are
/// independent bits. This is what makes re-admission race-free: a task that
/// parks on a wait-queue and is woken before its worker has finished
/// switching away is never mounted twice and never queued twice.
#[derive(Debug)]
pub(crate) struct State(AtomicU8);

impl State {
    pub(crate) fn new() -> State {
        State(AtomicU8::new(0))
    }

    pub(crate) fn transition_to_notified(&self) -> TransitionToNotified {
        let mut cur = self.0.load(Ordering::Acquire);
        loop {
            if cur & (COMPLETE | NOTIFIED) != 0 {
                return TransitionToNotified::NoOp;
            }
            match self.0.compare_exchange_weak(
                cur,
                cur | NOTIFIED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if cur & RUNNING != 0 => return TransitionToNotified::Deferred,
                Ok(_) => return TransitionToNotified::Submit,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Dispatch: consume the notification and mount the task.
    pub(crate) fn transition_to_running(&self) {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some((s | RUNNING) & !NOTIFIED)
            })
            .unwrap();
        debug_assert_eq!(prev & RUNNING, 0, "task mounted on two workers");
    }

    /// Unmount after a voluntary suspension. Returns true when a wake-up
    /// arrived while the task was mounted, in which case the caller must
    /// re-queue it.
    pub(crate) fn transition_to_idle(&self) -> bool {
        let prev = self.0.fetch_and(!RUNNING, Ordering::AcqRel);
        debug_assert_ne!(prev & RUNNING, 0, "idling a task that was not mounted");
        prev & NOTIFIED != 0
    }

    pub(crate) fn transition_to_complete(&self) {
        self.0.fetch_or(COMPLETE, Ordering::AcqRel);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire) & COMPLETE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_task_submits_once() {
        let state = State::new();
        assert_eq!(state.transition_to_notified(), TransitionToNotified::Submit);
        // A second wake before dispatch is absorbed.
        assert_eq!(state.transition_to_notified(), TransitionToNotified::NoOp);
    }

    #[test]
    fn wake_while_mounted_is_deferred_until_unmount() {
        let state = State::new();
        assert_eq!(state.transition_to_notified(), TransitionToNotified::Submit);
        state.transition_to_running();

        // Wake racing the suspension: seen at unmount, not submitted twice.
        assert_eq!(
            state.transition_to_notified(),
            TransitionToNotified::Deferred
        );
        assert!(state.transition_to_idle());
    }

    #[test]
    fn quiet_unmount_requires_no_requeue() {
        let state = State::new();
        state.transition_to_notified();
        state.transition_to_running();
        assert!(!state.transition_to_idle());
    }

    #[test]
    fn complete_is_terminal() {
        let state = State::new();
        state.transition_to_notified();
        state.transition_to_running();
        state.transition_to_complete();
        assert!(state.is_complete());
        assert_eq!(state.transition_to_notified(), TransitionToNotified::NoOp);
    }
}
