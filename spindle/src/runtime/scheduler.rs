use crate::runtime::RuntimeConfig;
use crate::runtime::queue::RunQueue;
use crate::runtime::worker::{self, Proc};
use crate::task::{Task, TaskBody, TaskHandle, TransitionToNotified};
use crate::time::Timer;
use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

/// Scheduler state shared by the runtime handle, its workers, and (via weak
/// back-references) every task it has spawned.
pub(crate) struct Shared {
    pub(crate) cfg: RuntimeConfig,
    pub(crate) queue: RunQueue,
    pub(crate) timer: Timer,
    workers: Mutex<Vec<WorkerHandle>>,
}

struct WorkerHandle {
    proc: Arc<Proc>,
    join: thread::JoinHandle<()>,
}

impl Shared {
    pub(crate) fn new(cfg: RuntimeConfig) -> Result<Arc<Shared>> {
        let shared = Arc::new(Shared {
            cfg,
            queue: RunQueue::new(),
            timer: Timer::new(),
            workers: Mutex::new(Vec::new()),
        });

        shared.timer.start()?;
        // One worker eagerly; the rest come up on demand as tasks arrive.
        shared
            .spawn_worker()
            .context("failed to spawn the initial worker")?;

        Ok(shared)
    }

    /// Admission point: spawn a task running `f` and return the handle to
    /// its completion and result.
    pub(crate) fn spawn<F, R>(self: &Arc<Self>, name: String, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let result = Arc::new(Mutex::new(None));
        let slot = result.clone();
        let body: TaskBody = Box::new(move || {
            *slot.lock() = Some(f());
        });
        let task = Task::new(name, Arc::downgrade(self), body);

        // Grow the pool toward the cap as new work arrives.
        if let Err(e) = self.spawn_worker() {
            tracing::warn!(error = %e, "failed to grow the worker pool");
        }

        self.wake(task.clone());
        TaskHandle::new(task, result)
    }

    /// Re-admit a task (new, or woken by a channel, the timer, or a
    /// completed dependency). Already-queued, mounted, and completed tasks
    /// are filtered by the state transition.
    pub(crate) fn wake(&self, task: Arc<Task>) {
        match task.state().transition_to_notified() {
            TransitionToNotified::Submit => self.queue.push(task),
            TransitionToNotified::Deferred | TransitionToNotified::NoOp => {}
        }
    }

    fn spawn_worker(self: &Arc<Self>) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.len() >= self.cfg.worker_threads {
            return Ok(());
        }

        let proc = Arc::new(Proc::new());
        let shared = self.clone();
        let worker_proc = proc.clone();
        let join = thread::Builder::new()
            .name((self.cfg.thread_name.0)())
            .spawn(move || worker::main_loop(shared, worker_proc))?;

        workers.push(WorkerHandle { proc, join });
        Ok(())
    }

    /// Flag every worker for exit, wake them with one sentinel each, join
    /// them, then stop the timer thread. Tasks still queued are abandoned.
    /// Idempotent; must not be called from a worker thread.
    pub(crate) fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.proc.force_exit();
        }
        self.queue.push_sentinels(workers.len());
        for worker in workers {
            if worker.join.join().is_err() {
                tracing::error!("a worker thread panicked before shutdown");
            }
        }
        self.timer.shutdown();
    }
}

// Test-only helpers
#[cfg(test)]
impl Shared {
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("cfg", &self.cfg)
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}
