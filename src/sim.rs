//! Host-side stand-in for the processor, used by the unit tests.
//!
//! `Sim` owns a scheduler bound to heap-allocated stacks and plays the part
//! of the port layer: it passes stack pointers into
//! [`switch_context`](crate::arch::switch_context) the way the context switch
//! code would, and "waiting for an interrupt" simply delivers one tick.

use std::boxed::Box;
use std::vec::Vec;

use crate::arch::{self, Platform};
use crate::config::{MAX_THREADS, STACK_SIZES};
use crate::errors::KernelFault;
use crate::mask::ThreadId;
use crate::scheduler::Scheduler;
use crate::stack::{StackRegion, STACK_ALIGN};

#[repr(C, align(8))]
struct Chunk([u8; STACK_ALIGN]);

/// One heap buffer per thread slot, sized like the real stacks.
pub struct TestStacks {
    buffers: Vec<Box<[Chunk]>>,
}

impl TestStacks {
    pub fn new() -> Self {
        let buffers = STACK_SIZES
            .iter()
            .map(|&len| {
                (0..len.div_ceil(STACK_ALIGN))
                    .map(|_| Chunk([0; STACK_ALIGN]))
                    .collect()
            })
            .collect();
        Self { buffers }
    }

    pub fn regions(&mut self) -> [StackRegion; MAX_THREADS] {
        core::array::from_fn(|id| {
            let buffer = &mut self.buffers[id];
            let len = buffer.len() * STACK_ALIGN;
            unsafe { StackRegion::new(buffer.as_mut_ptr() as *mut u8, len) }
        })
    }
}

/// Simulated processor running the kernel.
pub struct Sim {
    pub scheduler: Scheduler,
    /// Backing memory of every stack region the scheduler points into.
    _stacks: TestStacks,
    /// Number of times the CPU idled waiting for an interrupt.
    pub waits: usize,
}

impl Platform for Sim {
    fn with_scheduler<R>(&mut self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        f(&mut self.scheduler)
    }

    fn wait_for_interrupt(&mut self) {
        self.waits += 1;
        self.scheduler.tick();
    }
}

impl Sim {
    /// Booted kernel: thread 0 running, nothing else created.
    pub fn new() -> Self {
        let mut stacks = TestStacks::new();
        let mut scheduler = Scheduler::new();
        scheduler.init(stacks.regions());
        Self {
            scheduler,
            _stacks: stacks,
            waits: 0,
        }
    }

    /// Switch away from the current thread as if it had not touched its
    /// stack since it was last resumed. Returns the thread switched to.
    pub fn switch(&mut self) -> Result<ThreadId, KernelFault> {
        let sp = self.scheduler.threads.get(self.scheduler.current()).stack_pointer;
        self.switch_with_sp(sp)
    }

    /// Switch away from the current thread, saving `sp` as its live stack
    /// pointer.
    pub fn switch_with_sp(&mut self, sp: *mut usize) -> Result<ThreadId, KernelFault> {
        let resumed = arch::switch_context(self, sp)?;
        let current = self.scheduler.current();
        assert_eq!(resumed, self.scheduler.threads.get(current).stack_pointer);
        Ok(current)
    }

    /// Switch until `id` is running.
    pub fn switch_to(&mut self, id: ThreadId) {
        for _ in 0..MAX_THREADS {
            if self.scheduler.current() == id {
                return;
            }
            self.switch().unwrap();
        }
        assert_eq!(self.scheduler.current(), id, "thread {id} never scheduled");
    }

    /// Deliver `ticks` tick interrupts. Returns whether any of them asked
    /// for a preemptive switch.
    pub fn advance(&mut self, ticks: u32) -> bool {
        let mut expired = false;
        for _ in 0..ticks {
            expired |= self.scheduler.tick();
        }
        expired
    }
}
