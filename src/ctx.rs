//! Execution contexts: one suspended flow of control per thread.
//!
//! A [`Context`] is a stack plus the callee-saved register state needed to
//! resume execution exactly where it suspended. It is an opaque, move-only
//! resource: there is never more than one live handle to the same flow of
//! control, and dropping a `Context` releases its stack mapping.
//!
//! Transfers happen through [`switch`] (save the running flow into `from`,
//! resume `to`) and [`jump`] (resume `to` without saving, the one-way exit
//! path). Both only save the registers the SysV/AAPCS calling conventions
//! require a callee to preserve; everything else is dead across an explicit
//! function call.

use memmap2::MmapMut;
use std::arch::naked_asm;
use std::io;

/// Size of each thread's stack mapping.
pub(crate) const STACK_SIZE: usize = 256 * 1024;

/// Magic word written at the low end of every mapped stack, checked at
/// switch-out to catch overflows before they corrupt a neighbor.
pub(crate) const STACK_MAGIC: usize = 0xdead_beef_cafe_babe;

/// A saved stack + register state representing one flow of control.
pub(crate) struct Context {
    /// Saved stack pointer. Meaningful only while the context is switched
    /// out; stale the instant the context is resumed.
    sp: usize,
    /// Backing stack. `None` for a context adopted from an already-running
    /// flow (the bootstrap thread), which runs on the stack it was born with.
    stack: Option<MmapMut>,
}

impl Context {
    /// Allocate a fresh context that will begin executing at `entry` when
    /// first resumed.
    ///
    /// The new stack carries a forged callee-saved frame whose return
    /// address is `entry`, so the first [`switch`] into it "returns" into
    /// the entry function on the new stack.
    pub(crate) fn new(entry: extern "C" fn() -> !) -> io::Result<Context> {
        let mut stack = MmapMut::map_anon(STACK_SIZE)?;
        let base = stack.as_mut_ptr();
        unsafe {
            (base.cast::<usize>()).write(STACK_MAGIC);
            let top = base.add(STACK_SIZE);
            let frame = top.sub(size_of::<SwitchFrame>()).cast::<SwitchFrame>();
            frame.write(SwitchFrame::initial(entry));
            Ok(Context {
                sp: frame as usize,
                stack: Some(stack),
            })
        }
    }

    /// Wrap the currently running flow of control so it can later be
    /// resumed. The saved stack pointer is filled in by the first switch
    /// away from it.
    pub(crate) fn adopt() -> Context {
        Context { sp: 0, stack: None }
    }

    /// Whether the stack canary is still in place. Always true for adopted
    /// contexts, which have no mapping of their own.
    pub(crate) fn canary_intact(&self) -> bool {
        match &self.stack {
            Some(stack) => unsafe { stack.as_ptr().cast::<usize>().read() == STACK_MAGIC },
            None => true,
        }
    }
}

/// Transfer execution from `from` to `to`.
///
/// Returns only when `from` is rescheduled, which may be never.
///
/// # Safety
/// `to` must hold the saved state of a suspended flow (a fresh context or
/// one previously saved by `switch`), and no other handle may resume it.
pub(crate) unsafe fn switch(from: &mut Context, to: &Context) {
    unsafe { switch_stacks(&mut from.sp, to.sp) }
}

/// Transfer execution to `to` without saving the current flow.
///
/// Used on the exit path, where the current context is already parked in
/// the scheduler's graveyard and must never be resumed.
///
/// # Safety
/// Same as [`switch`]; additionally, the current stack must stay mapped
/// until some other flow of control is executing.
pub(crate) unsafe fn jump(to: &Context) -> ! {
    unsafe { jump_stack(to.sp) }
}

// x86_64 SysV: rbp, rbx, r12-r15 are callee-saved. The frame layout must
// match the push/pop order in `switch_stacks`.

#[cfg(target_arch = "x86_64")]
#[repr(C)]
struct SwitchFrame {
    r15: usize,
    r14: usize,
    r13: usize,
    r12: usize,
    rbx: usize,
    rbp: usize,
    ret_addr: usize,
    /// Fake caller return address; stops unwinders walking off the stack.
    end_of_stack: usize,
}

#[cfg(target_arch = "x86_64")]
impl SwitchFrame {
    fn initial(entry: extern "C" fn() -> !) -> SwitchFrame {
        SwitchFrame {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            ret_addr: entry as usize,
            end_of_stack: 0,
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
unsafe extern "C" fn switch_stacks(_save: *mut usize, _to_sp: usize) {
    // RDI: where to store the outgoing stack pointer. RSI: incoming stack
    // pointer. rflags needs no saving; both sides sit at a plain call site.
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}

#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
unsafe extern "C" fn jump_stack(_to_sp: usize) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

// aarch64 AAPCS: x19-x28, fp (x29), lr (x30) and d8-d15 are callee-saved.
// The frame layout must match the stp/ldp offsets in `switch_stacks`.

#[cfg(target_arch = "aarch64")]
#[repr(C)]
struct SwitchFrame {
    x: [usize; 10], // x19..=x28
    fp: usize,
    lr: usize,
    d: [u64; 8], // d8..=d15
}

#[cfg(target_arch = "aarch64")]
impl SwitchFrame {
    fn initial(entry: extern "C" fn() -> !) -> SwitchFrame {
        SwitchFrame {
            x: [0; 10],
            fp: 0,
            lr: entry as usize,
            d: [0; 8],
        }
    }
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
unsafe extern "C" fn switch_stacks(_save: *mut usize, _to_sp: usize) {
    // x0: where to store the outgoing stack pointer. x1: incoming stack
    // pointer. `ret` resumes at the restored link register.
    naked_asm!(
        "sub sp, sp, #0xa0",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8, d9, [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x9, sp",
        "str x9, [x0]",
        "mov sp, x1",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8, d9, [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        "ret",
    );
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
unsafe extern "C" fn jump_stack(_to_sp: usize) -> ! {
    naked_asm!(
        "mov sp, x0",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8, d9, [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        "ret",
    )
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("strand supports x86_64 and aarch64 only");
