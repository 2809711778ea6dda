//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick configuration, the boot-stack handover, and the context switch
//! paths for both scheduling strategies.
//!
//! ## Stacks
//!
//! - **PSP** (Process Stack Pointer): used by threads in Thread mode
//! - **MSP** (Main Stack Pointer): used by exception handlers and by the
//!   scheduler itself, on the dedicated kernel stack
//!
//! Thread 0 is the code that called `kernel::initialize`; it keeps running
//! on the top of the boot stack, which becomes its thread stack when
//! [`adopt_boot_stack`] moves it over to PSP.
//!
//! ## Switch paths
//!
//! - **Cooperative** ([`yield_context`]): an ordinary call. It pushes
//!   `R4–R11, LR` on the thread stack, moves to MSP, runs the scheduler, and
//!   pops the same frame shape from the next thread's stack.
//! - **Preemptive** (`PendSV`): the hardware stacks `R0–R3, R12, LR, PC,
//!   xPSR` on exception entry; the handler adds `R4–R11` below them.
//!
//! Both paths run the scheduler with interrupts disabled.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xE0, one step above PendSV so it can still fire while the
//!   scheduler idles inside PendSV
//! - PendSV: 0xFF (lowest), so a switch never preempts another handler

use core::arch::naked_asm;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::{asm, interrupt};

use crate::arch::{self, Platform};
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::errors::{self, KernelFault};
use crate::scheduler::Scheduler;

/// Priority of the SysTick exception.
const SYSTICK_PRIORITY: u32 = 0xE0;

/// Priority of the PendSV exception.
const PENDSV_PRIORITY: u32 = 0xFF;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Program SysTick and PendSV priorities in SHPR3.
pub fn set_interrupt_priorities() {
    // System Handler Priority Register 3: 0xE000_ED20
    // Bits [23:16] = PendSV priority
    // Bits [31:24] = SysTick priority
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let val = core::ptr::read_volatile(SHPR3) & 0x0000_FFFF;
        let val = val | (PENDSV_PRIORITY << 16) | (SYSTICK_PRIORITY << 24);
        core::ptr::write_volatile(SHPR3, val);
    }
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a PendSV exception. Taken as soon as no other handler is active and
/// interrupts are enabled.
#[inline]
pub fn trigger_pendsv() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
    asm::dsb();
    asm::isb();
}

// ---------------------------------------------------------------------------
// Boot stack handover
// ---------------------------------------------------------------------------

/// Move the caller onto PSP without changing its stack pointer, then point
/// MSP at `kernel_stack_top`.
///
/// After this returns the caller is thread 0: it keeps its frames on the
/// boot stack, now addressed through PSP, and every exception handler runs
/// on the kernel stack.
///
/// # Safety
/// Must be called once, from Thread mode, while still on MSP.
/// `kernel_stack_top` must be the 8-byte aligned top of memory reserved
/// for the kernel stack.
#[unsafe(naked)]
pub unsafe extern "C" fn adopt_boot_stack(kernel_stack_top: *mut u8) {
    naked_asm!(
        "
    // psp = msp, then select psp for Thread mode
    mrs     r1, msp
    msr     psp, r1
    movs    r1, #2
    msr     control, r1
    isb

    // msp = kernel stack, used from now on by handlers only
    msr     msp, r0
    bx      lr
    "
    );
}

// ---------------------------------------------------------------------------
// Scheduler entry from the switch paths
// ---------------------------------------------------------------------------

/// The real platform: kernel state behind the global critical section, and
/// `wfi` for idling.
pub struct CortexM;

impl Platform for CortexM {
    fn with_scheduler<R>(&mut self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        crate::kernel::with_scheduler(f)
    }

    fn wait_for_interrupt(&mut self) {
        // A pending interrupt ends wfi even while masked. Open a window for
        // it to run, then mask again before looking at the ready set.
        asm::wfi();
        unsafe { interrupt::enable() };
        interrupt::disable();
    }
}

/// Called from the switch paths with the outgoing stack pointer in `r0`;
/// returns the incoming one in `r0`.
extern "C" fn switch_from(sp: *mut usize) -> *mut usize {
    arch::switch_context(&mut CortexM, sp).unwrap_or_else(|fault| errors::fatal(fault))
}

// ---------------------------------------------------------------------------
// Cooperative switch
// ---------------------------------------------------------------------------

/// Save the calling thread and resume the next ready one.
///
/// Returns when the calling thread is scheduled again. A thread that starts
/// fresh "returns" from here into its entry point.
///
/// # Safety
/// Must be called from Thread mode on PSP, outside any critical section.
#[cfg(not(feature = "preemptive"))]
#[unsafe(naked)]
pub unsafe extern "C" fn yield_context() {
    naked_asm!(
        "
    cpsid   i

    // Save callee-saved registers and the return address on the thread stack
    push    {{ r4 - r11, lr }}
    mov     r0, sp

    // Run the scheduler on the kernel stack
    movs    r1, #0
    msr     control, r1
    isb
    bl      {switch}

    // r0 = saved stack pointer of the next thread
    msr     psp, r0
    movs    r1, #2
    msr     control, r1
    isb

    pop     {{ r4 - r11, lr }}
    cpsie   i
    bx      lr
    ",
        switch = sym switch_from,
    );
}

/// Give up the CPU now.
#[cfg(not(feature = "preemptive"))]
pub fn reschedule() {
    unsafe { yield_context() }
}

// ---------------------------------------------------------------------------
// Preemptive switch
// ---------------------------------------------------------------------------

/// Give up the CPU now. The pended PendSV is taken before this returns.
#[cfg(feature = "preemptive")]
pub fn reschedule() {
    trigger_pendsv();
}

/// PendSV exception handler, the preemptive context switch.
///
/// On entry the hardware has stacked `R0–R3, R12, LR, PC, xPSR` on the
/// running thread's PSP. The handler pushes `R4–R11` below them, lets the
/// scheduler pick the next thread, pops `R4–R11` from that thread's stack
/// and returns to Thread mode on PSP, which unstacks the rest.
///
/// # Safety
/// Only the NVIC calls this.
#[cfg(feature = "preemptive")]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "
    cpsid   i

    // Stack the current thread
    mrs     r0, psp
    stmdb   r0!, {{ r4 - r11 }}

    bl      {switch}

    // Unstack the next thread
    ldmia   r0!, {{ r4 - r11 }}
    msr     psp, r0
    cpsie   i

    // Return to Thread mode on the process stack
    mov     lr, #0xFFFFFFFD
    bx      lr
    ",
        switch = sym switch_from,
    );
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, the scheduler tick.
///
/// Pends a switch when the running thread's time slice is over. The
/// cooperative build never arms a slice.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    let expired = crate::kernel::with_scheduler(Scheduler::tick);
    if cfg!(feature = "preemptive") && expired {
        trigger_pendsv();
    }
}

// ---------------------------------------------------------------------------
// Fault signalling
// ---------------------------------------------------------------------------

/// Mask every interrupt and blink the fault indicator forever.
pub fn signal_fault(fault: KernelFault) -> ! {
    interrupt::disable();
    let indicator = crate::kernel::fault_indicator();
    let half_period = SYSTEM_CLOCK_HZ / 1000 * fault.blink_period_ms();

    let mut on = true;
    loop {
        if let Some(indicator) = indicator {
            indicator(on);
        }
        on = !on;
        asm::delay(half_period);
    }
}
