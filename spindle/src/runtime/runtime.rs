use crate::runtime::Shared;
use crate::task::TaskHandle;
use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

/// Default stack size for task fibers. Cooperative tasks carry shallow call
/// stacks, but logging and formatting need more headroom than the bare
/// minimum.
const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Environment variable bounding the worker pool, checked when the worker
/// cap is not set explicitly. Defaults to the hardware concurrency.
const MAX_PROCS_ENV: &str = "COMAXPROCS";

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

// Short enough to survive the 15-byte pthread name limit with the index
// intact.
fn default_thread_name_fn() -> ThreadNameFn {
    let next = Arc::new(AtomicUsize::new(0));
    ThreadNameFn(Arc::new(move || {
        format!("spindle-{}", next.fetch_add(1, Ordering::Relaxed))
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Configures and constructs a [`Runtime`].
///
/// ```no_run
/// use spindle::runtime::Builder;
///
/// let runtime = Builder::new()
///     .worker_threads(2)
///     .try_build()
///     .expect("failed to build runtime");
///
/// let handle = runtime.spawn("answer", || 6 * 7);
/// assert_eq!(handle.join(), 42);
/// ```
#[derive(Debug)]
pub struct Builder {
    /// Upper bound on worker threads. When unset, `COMAXPROCS` decides,
    /// falling back to the hardware concurrency.
    worker_threads: Option<usize>,

    /// Stack size in bytes for every task fiber.
    stack_size: usize,

    /// Name fn for threads spawned by the runtime.
    thread_name: ThreadNameFn,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            worker_threads: None,
            stack_size: DEFAULT_STACK_SIZE,
            thread_name: default_thread_name_fn(),
        }
    }

    /// Caps the number of worker threads, overriding `COMAXPROCS`.
    ///
    /// # Panics
    ///
    /// Panics if `val` is zero.
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker threads cannot be set to 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets the stack size (in bytes) for task fibers. Stacks do not grow;
    /// a task that outruns its stack is undefined behavior.
    ///
    /// # Panics
    ///
    /// Panics if `val` is zero.
    pub fn stack_size(mut self, val: usize) -> Self {
        assert!(val > 0, "fiber stack size cannot be set to 0");
        self.stack_size = val;
        self
    }

    /// Sets a function used to generate the names of threads spawned by the
    /// runtime. The default yields `spindle-{N}` with increasing N.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Creates the configured `Runtime`, with one worker already running.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg: RuntimeConfig = self.try_into()?;
        Ok(Runtime {
            shared: Shared::new(cfg)?,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) worker_threads: usize,
    pub(crate) stack_size: usize,
    pub(crate) thread_name: ThreadNameFn,
}

fn parse_max_procs(raw: &str) -> Result<usize> {
    let parsed = raw
        .trim()
        .parse::<usize>()
        .map_err(|e| anyhow!("failed to parse {MAX_PROCS_ENV}={raw:?}: {e}"))?;
    if parsed == 0 {
        bail!("{MAX_PROCS_ENV} must be greater than 0");
    }
    Ok(parsed)
}

fn worker_cap_from_env() -> Result<usize> {
    match std::env::var(MAX_PROCS_ENV) {
        Ok(raw) => parse_max_procs(&raw),
        Err(std::env::VarError::NotPresent) => Ok(thread::available_parallelism()?.get()),
        Err(e) => Err(anyhow!("failed to read {MAX_PROCS_ENV}: {e}")),
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = match builder.worker_threads {
            Some(explicit) => explicit,
            None => worker_cap_from_env()?,
        };

        Ok(RuntimeConfig {
            worker_threads,
            stack_size: builder.stack_size,
            thread_name: builder.thread_name,
        })
    }
}

/// An M:N scheduler multiplexing cooperative tasks over a pool of worker
/// threads.
///
/// Most callers never touch this type: [`run`](crate::run) spawns on a
/// process-wide runtime initialized on first use. Embedders and tests can
/// build private instances through [`Builder`]. Dropping a runtime (or
/// calling [`shutdown`](Runtime::shutdown)) joins its workers and timer
/// thread; tasks still runnable at that point are abandoned.
#[derive(Debug)]
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// The process-wide runtime, configured from the environment on first
    /// use.
    ///
    /// # Panics
    ///
    /// Panics when initialization fails, e.g. on an unparseable
    /// `COMAXPROCS`.
    pub fn global() -> &'static Runtime {
        static GLOBAL: OnceLock<Runtime> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Builder::new()
                .try_build()
                .expect("failed to initialize the spindle runtime")
        })
    }

    /// Spawn a task running `f`, returning a handle to its completion and
    /// return value. The task starts as soon as a worker picks it up.
    pub fn spawn<F, R>(&self, name: impl Into<String>, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.shared.spawn(name.into(), f)
    }

    /// Join all workers and the timer thread. Idempotent; also performed on
    /// drop. Must not be called from inside a task.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

// Test-only helpers
#[cfg(test)]
impl Runtime {
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}
