use crate::task::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// The global FIFO of runnable tasks.
///
/// `None` entries are shutdown sentinels: they wake a worker without handing
/// it work, so the worker's loop can re-check its exit flag.
pub(crate) struct RunQueue {
    inner: Mutex<VecDeque<Option<Arc<Task>>>>,
    cv: Condvar,
}

impl RunQueue {
    pub(crate) fn new() -> RunQueue {
        RunQueue {
            inner: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, task: Arc<Task>) {
        self.inner.lock().push_back(Some(task));
        self.cv.notify_one();
    }

    /// One sentinel per worker at shutdown.
    pub(crate) fn push_sentinels(&self, count: usize) {
        let mut queue = self.inner.lock();
        for _ in 0..count {
            queue.push_back(None);
        }
        drop(queue);
        self.cv.notify_all();
    }

    /// Block until an entry is available and pop the front one.
    pub(crate) fn pop(&self) -> Option<Arc<Task>> {
        let mut queue = self.inner.lock();
        loop {
            if let Some(entry) = queue.pop_front() {
                return entry;
            }
            self.cv.wait(&mut queue);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl std::fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunQueue")
            .field("len", &self.inner.lock().len())
            .finish()
    }
}
