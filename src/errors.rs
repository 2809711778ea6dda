//! # Kernel Faults
//!
//! The two fatal conditions the kernel can detect, and the handlers that
//! take over the processor when one occurs.
//!
//! Faults are never handed back to a thread: by the time one is detected
//! the faulting thread is no longer in control. The scheduler returns them
//! as `Err` up to the port boundary, which diverges into [`fatal`]. From the
//! outside the system stops making progress and the fault indicator starts
//! blinking with a pattern specific to the fault.

use core::fmt;

use crate::config::{STACK_OVERFLOW_BLINK_MS, UNINITIALIZED_BLINK_MS};
use crate::mask::ThreadId;

/// Callback driving an external fault indicator, e.g. an LED pin.
/// Called with `true`/`false` alternately while the kernel is halted.
pub type FaultIndicator = fn(bool);

/// Non-recoverable kernel fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelFault {
    /// The canary at the bottom of this thread's stack was overwritten.
    StackOverflow(ThreadId),
    /// A slot that was never created got scheduled.
    UninitializedThread,
}

impl KernelFault {
    /// Half-period of the indicator blink pattern for this fault.
    pub const fn blink_period_ms(self) -> u32 {
        match self {
            KernelFault::StackOverflow(_) => STACK_OVERFLOW_BLINK_MS,
            KernelFault::UninitializedThread => UNINITIALIZED_BLINK_MS,
        }
    }
}

impl fmt::Display for KernelFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelFault::StackOverflow(id) => write!(f, "stack overflow in thread {id}"),
            KernelFault::UninitializedThread => f.write_str("uninitialized thread scheduled"),
        }
    }
}

/// Report `fault` and halt. Does not return.
pub fn fatal(fault: KernelFault) -> ! {
    kerror!("kernel fault: {}", fault);
    crate::arch::halt(fault)
}

/// Entry point of every slot that was never created.
pub extern "C" fn uninitialized_thread() -> ! {
    fatal(KernelFault::UninitializedThread)
}
