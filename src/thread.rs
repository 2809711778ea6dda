//! # Thread Control Table
//!
//! Per-slot metadata for the fixed set of threads. Each entry records where
//! the thread's stack lives, where its canary is, the entry point it starts
//! at, and the stack pointer saved the last time it was switched out.
//!
//! Entries are bound to their stack regions once at boot and reused in place
//! forever; [`ThreadControl::reset`] rewinds an entry to a fresh start at a
//! new entry point.
//!
//! ## Ownership of `stack_pointer`
//!
//! The saved stack pointer of the running thread is stale: the processor's
//! live stack pointer is the truth until the next switch-out stores it. The
//! field is only written while its thread is not running, either from the
//! scheduler on switch-out or by `reset` on a suspended slot.

use core::ptr;

use crate::config::MAX_THREADS;
use crate::context;
use crate::errors;
use crate::mask::ThreadId;
use crate::stack::{self, StackRegion};

/// A thread entry point: a zero-argument procedure that never returns.
pub type EntryPoint = extern "C" fn() -> !;

/// Thread Control Block for one slot.
#[derive(Debug, Clone, Copy)]
pub struct ThreadControl {
    /// Saved top of stack. Valid only while the thread is switched out.
    pub stack_pointer: *mut usize,

    /// Highest (aligned) address of the private stack region.
    pub stack_base: *mut usize,

    /// Lowest address of the stack region, holding the canary byte.
    pub canary: *mut u8,

    /// Procedure the thread starts in after its last (re)creation.
    pub entry: EntryPoint,

    /// Whether a create operation has ever targeted this slot.
    pub created: bool,
}

// Safety: the raw pointers always point into the slot's own stack region,
// and entries are only touched inside critical sections.
unsafe impl Send for ThreadControl {}

impl ThreadControl {
    /// An unbound slot. Running it lands in the uninitialized-thread handler.
    pub const EMPTY: Self = Self {
        stack_pointer: ptr::null_mut(),
        stack_base: ptr::null_mut(),
        canary: ptr::null_mut(),
        entry: errors::uninitialized_thread,
        created: false,
    };

    /// Attach the slot to its stack region and write the canary.
    ///
    /// The entry point is left at the uninitialized-thread sentinel and the
    /// stack pointer at the base; call [`reset`](Self::reset) to make the
    /// slot runnable.
    pub fn bind(&mut self, region: StackRegion) {
        self.stack_base = region.base();
        self.stack_pointer = self.stack_base;
        self.canary = region.floor();
        self.entry = errors::uninitialized_thread;
        self.created = false;
        // SAFETY: the floor belongs to the region just bound to this slot.
        unsafe { stack::write_canary(self.canary) };
    }

    /// Rewind the stack and stage a synthetic frame that starts `entry`.
    ///
    /// The slot must be bound and its thread must not be executing on this
    /// stack.
    pub fn reset(&mut self, entry: EntryPoint) {
        debug_assert!(!self.stack_base.is_null());
        self.entry = entry;
        // SAFETY: stack_base is the aligned top of this slot's region, and
        // the thread is suspended so nothing else lives on that stack.
        unsafe {
            self.stack_pointer = context::push_initial_frame(self.stack_base, entry);
            stack::write_canary(self.canary);
        }
    }

    /// Whether the canary byte at the bottom of the stack is untouched.
    #[inline]
    pub fn canary_intact(&self) -> bool {
        // SAFETY: canary points at the floor of this slot's bound region.
        unsafe { stack::canary_intact(self.canary) }
    }
}

/// The fixed-size table of thread slots.
pub struct ThreadTable {
    slots: [ThreadControl; MAX_THREADS],
}

impl ThreadTable {
    pub const fn new() -> Self {
        Self {
            slots: [ThreadControl::EMPTY; MAX_THREADS],
        }
    }

    /// Bind every slot to its region.
    ///
    /// Slot 0 is the boot thread: it is already running on its region, so it
    /// is marked created and gets no synthetic frame. Every other slot gets a
    /// frame that enters the uninitialized-thread handler, so enabling a slot
    /// that was never created fails loudly instead of jumping through garbage.
    pub fn init(&mut self, regions: [StackRegion; MAX_THREADS]) {
        for (id, region) in regions.into_iter().enumerate() {
            let slot = &mut self.slots[id];
            slot.bind(region);
            if id == 0 {
                slot.created = true;
            } else {
                slot.reset(errors::uninitialized_thread);
            }
        }
    }

    #[inline]
    pub fn get(&self, id: ThreadId) -> &ThreadControl {
        &self.slots[id]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ThreadId) -> &mut ThreadControl {
        &mut self.slots[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadControl> {
        self.slots.iter()
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}
