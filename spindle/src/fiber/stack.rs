use anyhow::{Result, anyhow, bail};
use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

/// Both x86_64 and aarch64 require 16-byte stack alignment.
pub(super) const STACK_ALIGNMENT: usize = 16;

/// An owned, aligned stack region for a fiber.
///
/// The requested size is rounded up to the alignment so the top of the
/// region is itself aligned.
#[derive(Debug)]
pub(super) struct Stack {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Stack {
    pub(super) fn new(size: usize) -> Result<Stack> {
        if size == 0 {
            bail!("fiber stack size must be greater than 0");
        }

        let size = size.next_multiple_of(STACK_ALIGNMENT);
        let layout = Layout::from_size_align(size, STACK_ALIGNMENT)
            .map_err(|e| anyhow!("invalid stack layout for {size} bytes: {e}"))?;

        // Safety: layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            bail!("failed to allocate {size} byte fiber stack");
        };

        Ok(Stack { ptr, layout })
    }

    /// One past the highest usable byte. The stack grows down from here.
    pub(super) fn top(&self) -> *mut u8 {
        // Safety: stays within (one past) the allocation.
        unsafe { self.ptr.as_ptr().add(self.layout.size()) }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // Safety: allocated in `new` with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// Safety: the region is exclusively owned and only touched by whichever
// thread currently executes the owning fiber.
unsafe impl Send for Stack {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_size() {
        assert!(Stack::new(0).is_err());
    }

    #[test]
    fn top_is_aligned() {
        for size in [1, 24, 4096, 64 * 1024] {
            let stack = Stack::new(size).unwrap();
            assert_eq!(stack.top() as usize % STACK_ALIGNMENT, 0);
        }
    }
}
