//! # Thread Masks
//!
//! Per-thread condition bits (disabled, delayed, ready). Bit `i` set means
//! the condition holds for thread `i`. Bits at or above `MAX_THREADS` are
//! never set by any operation here, so `!mask` only yields valid ids.

use core::ops::{BitAnd, BitOr, Not};

use crate::config::MAX_THREADS;

/// Index of a thread slot, `0..MAX_THREADS`.
pub type ThreadId = usize;

/// Fixed-size bitset indexed by [`ThreadId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadMask(u32);

impl ThreadMask {
    /// No thread.
    pub const EMPTY: Self = Self(0);

    /// Every valid thread slot.
    pub const ALL: Self = Self((u64::MAX >> (64 - MAX_THREADS)) as u32);

    /// Mask with only `id` set.
    #[inline]
    pub const fn of(id: ThreadId) -> Self {
        debug_assert!(id < MAX_THREADS);
        Self(1 << id)
    }

    /// Mask with every valid slot except `id`.
    #[inline]
    pub const fn all_except(id: ThreadId) -> Self {
        Self(Self::ALL.0 & !Self::of(id).0)
    }

    /// Mask from raw bits; bits outside the valid slots are dropped.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, id: ThreadId) -> bool {
        id < MAX_THREADS && self.0 & (1 << id) != 0
    }

    #[inline]
    pub fn insert(&mut self, id: ThreadId) {
        self.0 |= Self::of(id).0;
    }

    #[inline]
    pub fn remove(&mut self, id: ThreadId) {
        self.0 &= !Self::of(id).0;
    }

    /// Sets or clears the bit for `id`.
    #[inline]
    pub fn set(&mut self, id: ThreadId, value: bool) {
        if value {
            self.insert(id);
        } else {
            self.remove(id);
        }
    }

    /// First id in the mask in circular order, starting just after `after`.
    ///
    /// `after` itself is the last candidate, so a mask holding only `after`
    /// yields `after` again.
    pub fn next_after(self, after: ThreadId) -> Option<ThreadId> {
        if self.is_empty() {
            return None;
        }
        (1..=MAX_THREADS)
            .map(|step| (after + step) % MAX_THREADS)
            .find(|&id| self.contains(id))
    }
}

impl BitOr for ThreadMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ThreadMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ThreadMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}
