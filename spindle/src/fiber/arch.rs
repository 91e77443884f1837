//! Register-level context switching.
//!
//! One implementation per CPU architecture; only x86_64 is supported today.

use std::arch::naked_asm;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("spindle only supports x86_64");

/// Saved CPU state for a suspended fiber.
///
/// On x86_64 System V these are the callee-saved registers a function must
/// preserve across calls, plus `rdi`: the first-argument register, loaded so
/// that the first switch into a fresh fiber lands in `entry(arg)`. The
/// instruction pointer is not stored here; it lives on the fiber's stack as
/// the return slot that [`switch_context`] pops.
#[repr(C)]
#[derive(Debug, Default)]
pub(crate) struct Context {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    rdi: u64,
}

// The asm below addresses fields by offset.
const _: () = {
    assert!(std::mem::offset_of!(Context, rsp) == 0x00);
    assert!(std::mem::offset_of!(Context, rbp) == 0x08);
    assert!(std::mem::offset_of!(Context, rbx) == 0x10);
    assert!(std::mem::offset_of!(Context, r12) == 0x18);
    assert!(std::mem::offset_of!(Context, r13) == 0x20);
    assert!(std::mem::offset_of!(Context, r14) == 0x28);
    assert!(std::mem::offset_of!(Context, r15) == 0x30);
    assert!(std::mem::offset_of!(Context, rdi) == 0x38);
};

impl Context {
    /// Seed a fresh context so the first switch lands in the entry function.
    ///
    /// `rsp` must point at a 16-byte-aligned stack slot holding the entry
    /// address; the final `ret` of [`switch_context`] pops it, which leaves
    /// the stack in the shape the ABI mandates right after a `call`.
    pub(super) fn prepare(&mut self, rsp: u64, arg: u64) {
        self.rsp = rsp;
        self.rdi = arg;
    }
}

/// Switch execution from one saved context to another.
///
/// Spills the callee-saved registers into `from` (the stack slot under `rsp`
/// keeps the return address, so no instruction pointer is stored explicitly),
/// then loads `to` and returns into it. For a suspended context that resumes
/// after its own `switch_context` call; for a fresh one it "returns" into the
/// entry function with `rdi` carrying the fiber argument. Switching a context
/// to itself restores what was just saved and falls through.
///
/// # Safety
///
/// Both pointers must be valid, and `from` must describe the currently
/// executing context; switching away from anything else leaves a stack
/// running under two owners.
#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch_context(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        // Spill callee-saved state into `from` (rdi).
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // Load `to` (rsi). rdi is loaded last: it doubles as the entry
        // argument on the first switch into a fresh fiber.
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "mov rdi, [rsi + 0x38]",
        // Pop the resume address off the target stack and jump.
        "ret",
    );
}
