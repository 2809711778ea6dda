//! # Context Frames
//!
//! The register block a suspended thread leaves on its own stack, and the
//! synthetic version of it that bootstraps a brand-new thread.
//!
//! The kernel never manipulates individual registers: it only writes an
//! initial frame below a thread's stack base and records the resulting stack
//! pointer. The port layer's restore path then pops that frame exactly as it
//! would pop a frame it saved itself, so the first "resume" of a thread lands
//! in its entry point.
//!
//! ## Cooperative frame (default)
//!
//! A switch only happens inside an explicit call, so the caller-saved
//! registers are already dead. Only the callee-saved set, which includes the
//! frame pointer `r7`, and the return address are kept:
//!
//! ```text
//!   high  LR   (entry point on first run)
//!         R11 … R4
//!   low   ◄─ stack_pointer
//! ```
//!
//! ## Preemptive frame (`preemptive` feature)
//!
//! A switch may happen at any instruction, so the full register file and the
//! status register are kept. The hardware stacks the upper eight words on
//! exception entry; PendSV pushes `R4–R11` below them:
//!
//! ```text
//!   high  xPSR (Thumb bit)
//!         PC   (entry point on first run)
//!         LR   (thread exit trap)
//!         R12, R3, R2, R1, R0
//!         R11 … R4
//!   low   ◄─ stack_pointer
//! ```

use core::mem;

use crate::thread::EntryPoint;

/// Number of callee-saved general purpose registers (`R4–R11`).
pub const CALLEE_SAVED: usize = 8;

/// Execution-state word with only the Thumb bit set.
pub const XPSR_THUMB: usize = 0x0100_0000;

/// Frame saved by a voluntary yield.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooperativeFrame {
    /// `R4–R11`, lowest address first.
    pub callee_saved: [usize; CALLEE_SAVED],
    /// Return address popped into `LR` and branched to.
    pub lr: usize,
}

impl CooperativeFrame {
    /// Frame that "returns" into `entry`.
    pub fn bootstrap(entry: EntryPoint) -> Self {
        Self {
            callee_saved: [0; CALLEE_SAVED],
            lr: entry as usize,
        }
    }

    /// Address the restore path resumes at.
    pub fn resume_address(&self) -> usize {
        self.lr
    }
}

/// Frame saved by the time-slice exception.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionFrame {
    /// `R4–R11`, pushed by PendSV.
    pub callee_saved: [usize; CALLEE_SAVED],
    pub r0: usize,
    pub r1: usize,
    pub r2: usize,
    pub r3: usize,
    pub r12: usize,
    pub lr: usize,
    pub pc: usize,
    pub xpsr: usize,
}

impl ExceptionFrame {
    /// Frame whose exception return lands on `entry` with interrupts enabled.
    pub fn bootstrap(entry: EntryPoint) -> Self {
        Self {
            callee_saved: [0; CALLEE_SAVED],
            r0: 0,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: thread_exit as EntryPoint as usize,
            // The stacked PC must be halfword aligned; Thumb state comes from xPSR.
            pc: entry as usize & !1,
            xpsr: XPSR_THUMB,
        }
    }

    pub fn resume_address(&self) -> usize {
        self.pc
    }
}

/// Frame layout used by the selected switch strategy.
#[cfg(not(feature = "preemptive"))]
pub type ContextFrame = CooperativeFrame;

/// Frame layout used by the selected switch strategy.
#[cfg(feature = "preemptive")]
pub type ContextFrame = ExceptionFrame;

/// Size of one saved context, in machine words.
pub const CONTEXT_WORDS: usize = mem::size_of::<ContextFrame>() / mem::size_of::<usize>();

/// Write an initial frame for `entry` just below `base` and return the
/// stack pointer that makes the restore path start the thread.
///
/// # Safety
/// `base` must be the word-aligned top of a stack region with room for at
/// least one [`ContextFrame`], and the region must not be in use.
pub unsafe fn push_initial_frame(base: *mut usize, entry: EntryPoint) -> *mut usize {
    let frame = (base as *mut ContextFrame).sub(1);
    frame.write(ContextFrame::bootstrap(entry));
    frame as *mut usize
}

/// Landing pad for an entry point that returns anyway. Entry points are
/// `-> !`, so reaching this means the stacked frame was corrupted.
extern "C" fn thread_exit() -> ! {
    crate::errors::fatal(crate::errors::KernelFault::UninitializedThread)
}
