//! # Kernel
//!
//! Global kernel state and the public thread API.
//!
//! The program's `main` becomes thread 0 by calling [`initialize`]. From
//! then on it creates and controls the other threads through this module.
//! Every call is safe from any thread; the ones that give up the CPU
//! (`delay`, `yield_now`, disabling or re-creating the caller) return only
//! once the caller is scheduled again.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         └─► kernel::initialize()
//!               ├─► Bind thread slots to their stacks
//!               ├─► Move main onto PSP as thread 0, MSP → kernel stack
//!               ├─► Configure SysTick
//!               └─► Set interrupt priorities
//!         ├─► kernel::create_thread() (×N)
//!         └─► ... main keeps running as thread 0
//! ```

use core::cell::Cell;
use core::ptr::{addr_of, addr_of_mut};

use cortex_m::interrupt::Mutex;

use crate::arch::cortex_m4;
use crate::config::{KERNEL_STACK_SIZE, MAX_THREADS, STACK_SIZES};
use crate::errors::FaultIndicator;
use crate::mask::ThreadId;
use crate::scheduler::Scheduler;
use crate::stack::{StackRegion, ThreadStacks};
use crate::sync::{self, Shared};
use crate::thread::EntryPoint;

// ---------------------------------------------------------------------------
// Global state
// ---------------------------------------------------------------------------

/// The one scheduler instance, shared with the SysTick and PendSV handlers.
static KERNEL: Shared<Scheduler> = Shared::new(Scheduler::new());

/// Indicator driven by the fault handler.
static FAULT_INDICATOR: Mutex<Cell<Option<FaultIndicator>>> = Mutex::new(Cell::new(None));

/// Stacks of threads 1..MAX_THREADS.
static mut THREAD_STACKS: ThreadStacks = ThreadStacks::new();

#[repr(C, align(8))]
struct KernelStack([u8; KERNEL_STACK_SIZE]);

/// Main stack for handlers and the scheduler once thread 0 owns the boot
/// stack.
static mut KERNEL_STACK: KernelStack = KernelStack([0; KERNEL_STACK_SIZE]);

extern "C" {
    /// Initial main stack pointer, provided by the linker script.
    static _stack_start: u32;
}

/// Run `f` on the kernel state inside a critical section.
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    KERNEL.with(f)
}

pub(crate) fn fault_indicator() -> Option<FaultIndicator> {
    sync::critical_section(|cs| FAULT_INDICATOR.borrow(cs).get())
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Turn the caller into thread 0 and start the tick.
///
/// Every other slot starts disabled and bound to the uninitialized-thread
/// trap until [`create_thread`] targets it. `indicator` is toggled by the
/// fault handler after a kernel fault.
///
/// Must be called exactly once, from `main`, before any other kernel call.
pub fn initialize(mut core_peripherals: cortex_m::Peripherals, indicator: Option<FaultIndicator>) {
    // SAFETY: called once before any thread exists; the stacks are handed
    // to the scheduler and never touched through these statics again.
    let regions: [StackRegion; MAX_THREADS] = unsafe {
        let stacks = &mut *addr_of_mut!(THREAD_STACKS);
        let boot_top = addr_of!(_stack_start) as *mut u8;
        core::array::from_fn(|id| match stacks.region(id) {
            Some(region) => region,
            None => StackRegion::ending_at(boot_top, STACK_SIZES[0]),
        })
    };

    sync::critical_section(|cs| {
        FAULT_INDICATOR.borrow(cs).set(indicator);
        KERNEL.with(|s| s.init(regions));

        // SAFETY: still on the boot stack in Thread mode, first and only call.
        unsafe {
            let kernel_top = addr_of_mut!(KERNEL_STACK).cast::<u8>().add(KERNEL_STACK_SIZE);
            cortex_m4::adopt_boot_stack(kernel_top);
        }
    });

    core_peripherals.SCB.clear_sleepdeep();
    cortex_m4::set_interrupt_priorities();
    cortex_m4::configure_systick(&mut core_peripherals.SYST);

    #[cfg(feature = "preemptive")]
    with_scheduler(|s| {
        let now = s.now();
        s.slice.arm(now);
    });

    kinfo!("kernel started, thread 0 running");
}

/// (Re)create thread `id` to start at `entry`, enabled or disabled.
///
/// Any previous context of the slot is discarded. Re-creating the calling
/// thread abandons the current call chain and does not return; the thread
/// starts over at `entry` when next scheduled.
pub fn create_thread(id: ThreadId, entry: EntryPoint, enabled: bool) {
    if with_scheduler(|s| s.create(id, entry, enabled)) {
        restart_current();
    }
}

/// Let thread `id` be scheduled. No effect on a thread that is already
/// enabled.
pub fn enable_thread(id: ThreadId) {
    with_scheduler(|s| s.enable(id));
}

/// Stop thread `id` from being scheduled. Disabling the calling thread
/// switches away immediately; the call returns once some other thread
/// enables it again.
pub fn disable_thread(id: ThreadId) {
    if with_scheduler(|s| s.disable(id)) {
        cortex_m4::reschedule();
    }
}

/// Sleep for at least `millis` milliseconds, letting other threads run.
/// `delay(0)` just gives the other ready threads a turn.
pub fn delay(millis: u16) {
    with_scheduler(|s| s.delay(millis));
    cortex_m4::reschedule();
}

/// Give the other ready threads a turn.
#[cfg(not(feature = "preemptive"))]
pub fn yield_now() {
    cortex_m4::reschedule();
}

/// Keep the calling thread from being preempted until [`unlock`].
/// Voluntary switches (`delay`, disabling oneself) still happen.
#[cfg(feature = "preemptive")]
pub fn lock() {
    with_scheduler(|s| s.lock());
}

/// Allow preemption again. A slice that ran out while locked ends at the
/// next tick.
#[cfg(feature = "preemptive")]
pub fn unlock() {
    with_scheduler(|s| s.unlock());
}

/// Milliseconds since [`initialize`], wrapping at `u32::MAX`.
pub fn millis() -> u32 {
    with_scheduler(|s| s.now())
}

/// Id of the calling thread.
pub fn current_thread() -> ThreadId {
    with_scheduler(|s| s.current())
}

/// Switch away from a thread whose context was just re-created. Its fresh
/// frame is staged during this switch, so control never comes back here.
fn restart_current() -> ! {
    cortex_m4::reschedule();
    loop {
        cortex_m::asm::wfi();
    }
}
