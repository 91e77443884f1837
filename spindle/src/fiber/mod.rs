//! Userspace execution contexts.
//!
//! A [`Fiber`] is a suspended execution context: an owned stack plus the
//! register snapshot needed to resume it at an arbitrary point, on whichever
//! OS thread performs the switch. Two flavors exist: stack-owning fibers
//! created for tasks, and thread-adopted fibers that capture a worker's own
//! call stack on the first switch away from it, so the worker can later be
//! switched back onto it.

mod arch;
mod stack;

pub(crate) use arch::Context;

use anyhow::Result;
use stack::{STACK_ALIGNMENT, Stack};

/// Entry point of a stack-owning fiber. Receives the `arg` given at creation
/// and must never return: a fiber ends by switching away for the last time.
pub type Entry = extern "C" fn(*mut ()) -> !;

/// A suspended execution context.
///
/// A fiber is exclusively owned by one task or worker, and its context may
/// only be switched *from* while it is the currently executing one. The
/// context is boxed so its address stays stable while switches write to it.
#[derive(Debug)]
pub struct Fiber {
    ctx: Box<arch::Context>,
    stack: Option<Stack>,
}

impl Fiber {
    /// Create a fiber that will run `entry(arg)` on a fresh, owned stack of
    /// `stack_size` bytes when first switched to.
    ///
    /// Fails if `stack_size` is zero or the stack cannot be allocated.
    pub fn new(stack_size: usize, entry: Entry, arg: *mut ()) -> Result<Fiber> {
        let stack = Stack::new(stack_size)?;
        let mut ctx = Box::new(arch::Context::default());

        // Seed the stack so the first switch "returns" into `entry`. The
        // slot above the entry address is zeroed: it is the return address
        // `entry` would see, and a null there stops any unwinder cold.
        unsafe {
            let top = stack.top();
            let entry_slot = top.sub(STACK_ALIGNMENT).cast::<u64>();
            entry_slot.write(entry as usize as u64);
            top.sub(8).cast::<u64>().write(0);
            ctx.prepare(entry_slot as u64, arg as u64);
        }

        Ok(Fiber {
            ctx,
            stack: Some(stack),
        })
    }

    /// Create a handle that adopts the calling thread's own stack.
    ///
    /// The context starts empty; the first switch *from* this fiber fills it
    /// in, capturing the thread's call frame as a resumable context. Dropping
    /// it releases only the handle, never the thread's stack.
    pub fn from_thread() -> Fiber {
        Fiber {
            ctx: Box::new(arch::Context::default()),
            stack: None,
        }
    }

    /// Raw pointer to the saved context, for use with [`switch`] after any
    /// guards protecting this fiber have been dropped.
    pub(crate) fn context_ptr(&self) -> *mut Context {
        (&*self.ctx as *const Context).cast_mut()
    }
}

// Safety: a fiber migrates between worker threads, but the scheduler
// guarantees at most one thread executes or switches it at a time.
unsafe impl Send for Fiber {}

/// Switch execution from `from` to `to`.
///
/// Control resumes wherever `to` last suspended (or at its entry function,
/// for a fresh fiber) and comes back here only when something switches into
/// `from` again. Switching a context to itself is a no-op that falls
/// through.
///
/// # Safety
///
/// `from` must be the context of the currently executing fiber, both
/// pointers must outlive the switch, and no lock may be held across it.
pub(crate) unsafe fn switch(from: *mut Context, to: *const Context) {
    unsafe { arch::switch_context(from, to) };
}
