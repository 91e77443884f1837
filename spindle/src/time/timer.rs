use crate::task::Task;
use anyhow::{Context as _, Result};
use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One parked task and its wake-up deadline. Ordered by `(when, seq)` so
/// equal deadlines fire in submission order.
struct Entry {
    when: Instant,
    seq: u64,
    task: Arc<Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.when.cmp(&other.when).then(self.seq.cmp(&other.seq))
    }
}

struct TimerState {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerInner {
    state: Mutex<TimerState>,
    cv: Condvar,
}

/// The timed-wakeup service: a single dedicated thread over a min-heap of
/// `(deadline, task)` entries. Due tasks are re-admitted to the scheduler;
/// the thread sleeps until the earliest deadline, or indefinitely when the
/// heap is empty.
pub(crate) struct Timer {
    inner: Arc<TimerInner>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Timer {
    pub(crate) fn new() -> Timer {
        Timer {
            inner: Arc::new(TimerInner {
                state: Mutex::new(TimerState {
                    heap: BinaryHeap::new(),
                    next_seq: 0,
                    shutdown: false,
                }),
                cv: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self) -> Result<()> {
        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("spindle-timer".into())
            .spawn(move || timer_loop(inner))
            .context("failed to spawn the timer thread")?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Schedule `task` to be re-admitted `duration` from now.
    pub(crate) fn add_sleep(&self, duration: Duration, task: Arc<Task>) {
        let mut state = self.inner.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Reverse(Entry {
            when: Instant::now() + duration,
            seq,
            task,
        }));
        drop(state);
        self.inner.cv.notify_one();
    }

    /// Stop and join the service thread. Entries that have not fired are
    /// dropped; their tasks stay parked. Idempotent.
    pub(crate) fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.inner.cv.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("pending", &self.inner.state.lock().heap.len())
            .finish()
    }
}

fn timer_loop(inner: Arc<TimerInner>) {
    tracing::debug!("timer thread started");

    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        match state.heap.peek().map(|Reverse(entry)| entry.when) {
            None => {
                inner.cv.wait(&mut state);
            }
            Some(when) if Instant::now() < when => {
                // Woken early by a new earlier deadline or by shutdown; the
                // loop re-evaluates either way.
                inner.cv.wait_until(&mut state, when);
            }
            Some(_) => {
                while state
                    .heap
                    .peek()
                    .is_some_and(|Reverse(entry)| entry.when <= Instant::now())
                {
                    let Reverse(entry) = state.heap.pop().unwrap();
                    tracing::trace!(task = entry.task.name(), "timer fired");
                    entry.task.wake();
                }
            }
        }
    }

    state.heap.clear();
    drop(state);
    tracing::debug!("timer thread exited");
}
