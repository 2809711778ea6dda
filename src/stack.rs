//! # Thread Stacks
//!
//! Stack regions for the thread slots and the canary byte that guards the
//! low end of each one.
//!
//! Stacks grow down. A region spans `[floor, top)`; the canary lives at
//! `floor` and the initial stack pointer is `top`, rounded down to the 8-byte
//! alignment AAPCS requires at public interfaces.
//!
//! ```text
//!   top  ─► ┌──────────────────┐  ◄─ stack_base
//!           │ synthetic frame  │
//!           │ ...              │  grows down
//!           │                  │
//!   floor ─►│ 0xAA canary      │
//!           └──────────────────┘
//! ```

use core::ptr;

use crate::config::{CANARY, MAX_THREADS, STACK_SIZES};
use crate::mask::ThreadId;

/// Stack alignment at a public call boundary (AAPCS).
pub const STACK_ALIGN: usize = 8;

/// A thread's private stack memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    floor: *mut u8,
    top: *mut u8,
}

impl StackRegion {
    /// Describe `len` bytes of stack starting at `floor`.
    ///
    /// # Safety
    /// `floor..floor + len` must be valid, writable memory that nothing else
    /// uses for as long as the region is bound to a thread slot.
    pub const unsafe fn new(floor: *mut u8, len: usize) -> Self {
        Self {
            floor,
            top: floor.wrapping_add(len),
        }
    }

    /// Describe the `len` bytes that end at `top`.
    ///
    /// # Safety
    /// Same requirements as [`StackRegion::new`].
    pub const unsafe fn ending_at(top: *mut u8, len: usize) -> Self {
        Self {
            floor: top.wrapping_sub(len),
            top,
        }
    }

    /// Lowest address of the region, where the canary lives.
    #[inline]
    pub fn floor(&self) -> *mut u8 {
        self.floor
    }

    /// Initial stack pointer: the top of the region, 8-byte aligned.
    #[inline]
    pub fn base(&self) -> *mut usize {
        let aligned = (self.top as usize) & !(STACK_ALIGN - 1);
        self.top.wrapping_sub(self.top as usize - aligned) as *mut usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.top as usize - self.floor as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write the sentinel byte at `canary`.
///
/// # Safety
/// `canary` must point into a stack region owned by a thread slot.
#[inline]
pub unsafe fn write_canary(canary: *mut u8) {
    ptr::write_volatile(canary, CANARY);
}

/// Whether the sentinel byte at `canary` is still intact.
///
/// # Safety
/// `canary` must point into a stack region owned by a thread slot.
#[inline]
pub unsafe fn canary_intact(canary: *const u8) -> bool {
    ptr::read_volatile(canary) == CANARY
}

// ---------------------------------------------------------------------------
// Static stack arena for threads 1..MAX_THREADS
// ---------------------------------------------------------------------------

const fn round_up(len: usize) -> usize {
    (len + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
}

/// Byte offset of each slot's region inside [`ThreadStacks`].
/// Slot 0 has no arena region; it takes over the boot stack.
const fn arena_offsets() -> [usize; MAX_THREADS + 1] {
    let mut offsets = [0; MAX_THREADS + 1];
    let mut id = 1;
    while id < MAX_THREADS {
        offsets[id + 1] = offsets[id] + round_up(STACK_SIZES[id]);
        id += 1;
    }
    offsets
}

const ARENA_OFFSETS: [usize; MAX_THREADS + 1] = arena_offsets();

/// Total bytes reserved for threads 1..MAX_THREADS.
pub const ARENA_SIZE: usize = ARENA_OFFSETS[MAX_THREADS];

/// Backing memory for every thread stack except thread 0's.
#[repr(C, align(8))]
pub struct ThreadStacks {
    bytes: [u8; ARENA_SIZE],
}

impl ThreadStacks {
    pub const fn new() -> Self {
        Self {
            bytes: [0; ARENA_SIZE],
        }
    }

    /// Region of slot `id`. `None` for slot 0, which has no arena region.
    pub fn region(&mut self, id: ThreadId) -> Option<StackRegion> {
        if id == 0 || id >= MAX_THREADS {
            return None;
        }
        let floor = self.bytes.as_mut_ptr().wrapping_add(ARENA_OFFSETS[id]);
        // SAFETY: the range lies inside `bytes`, and regions do not overlap.
        Some(unsafe { StackRegion::new(floor, round_up(STACK_SIZES[id])) })
    }
}

impl Default for ThreadStacks {
    fn default() -> Self {
        Self::new()
    }
}
