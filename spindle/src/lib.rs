//! A fiber-based M:N coroutine runtime.
//!
//! `spindle` multiplexes many cooperative tasks, each with its own private
//! stack, over a small pool of OS worker threads. Tasks yield only at
//! explicit suspension points: sending on a full [channel], receiving from
//! an empty one, [`sleep`], waiting on another task's handle, and returning
//! from the task body. A CPU-bound loop without a suspension point occupies
//! its worker until it yields.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! let (tx, rx) = spindle::channel();
//!
//! let producer = spindle::run("producer", move || {
//!     for i in 0..10 {
//!         tx.send(i);
//!         spindle::sleep(Duration::from_millis(50));
//!     }
//!     tx.send(-1);
//! });
//!
//! let consumer = spindle::run("consumer", move || {
//!     let mut total = 0;
//!     loop {
//!         match rx.recv() {
//!             -1 => break total,
//!             n => total += n,
//!         }
//!     }
//! });
//!
//! producer.wait();
//! assert_eq!(consumer.join(), 45);
//! ```
//!
//! The worker pool is capped by the `COMAXPROCS` environment variable
//! (default: hardware concurrency). Lifecycle events are emitted as
//! [`tracing`] events; install a subscriber to see them.

pub mod channel;
pub use channel::{Receiver, Sender, bounded, channel};

pub(crate) mod fiber;

pub mod runtime;
pub use runtime::{Builder, Runtime};

pub mod task;
pub use task::TaskHandle;

pub mod time;
pub use time::sleep;

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

/// Spawn a task on the process-wide runtime.
///
/// `name` identifies the task in lifecycle traces. Arguments are captured
/// by the closure; the return value is retrieved through the handle:
///
/// ```no_run
/// let handle = spindle::run("answer", || 6 * 7);
/// assert_eq!(handle.join(), 42);
/// ```
pub fn run<F, R>(name: impl Into<String>, f: F) -> TaskHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    Runtime::global().spawn(name, f)
}
