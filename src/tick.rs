//! # Tick Processing
//!
//! Work done once per millisecond by the system tick interrupt: count down
//! sleeping threads, advance the system clock and, in the preemptive build,
//! decide whether the running thread's time slice is over.
//!
//! The tick never switches contexts itself. It returns whether a switch is
//! due, and the port layer pends the switch exception.

use crate::config::TIME_SLICE_TICKS;
use crate::scheduler::{ScheduleControl, Scheduler};

impl ScheduleControl {
    /// Advance delay counters and the system clock by one millisecond.
    ///
    /// A thread whose counter reaches zero loses its delayed bit here and is
    /// ready again at the next scheduling decision. Threads without the bit
    /// are left alone, whatever their stale counter says.
    pub fn tick(&mut self) {
        for id in 0..self.delay_counters.len() {
            if !self.delayed.contains(id) {
                continue;
            }
            let counter = &mut self.delay_counters[id];
            if *counter <= 1 {
                *counter = 0;
                self.delayed.remove(id);
            } else {
                *counter -= 1;
            }
        }
        self.system_time = self.system_time.wrapping_add(1);
    }
}

// ---------------------------------------------------------------------------
// Time-slice channel
// ---------------------------------------------------------------------------

/// Compare channel that ends a thread's time slice.
///
/// Armed at every switch-in with a deadline [`TIME_SLICE_TICKS`] in the
/// future. Masked while the scheduler runs and while a thread holds the
/// preemption lock; a masked channel never fires, even after its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceTimer {
    deadline: u32,
    enabled: bool,
}

impl SliceTimer {
    pub const fn new() -> Self {
        Self {
            deadline: 0,
            enabled: false,
        }
    }

    /// Start a fresh slice at `now`.
    pub fn arm(&mut self, now: u32) {
        self.deadline = now.wrapping_add(TIME_SLICE_TICKS);
        self.enabled = true;
    }

    pub fn mask(&mut self) {
        self.enabled = false;
    }

    /// Re-enable the channel. The deadline is kept, so a slice that ran out
    /// while masked expires on the next tick.
    pub fn unmask(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the slice is over at `now`. Wrap-safe.
    pub fn expired(&self, now: u32) -> bool {
        self.enabled && (now.wrapping_sub(self.deadline) as i32) >= 0
    }
}

impl Default for SliceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Tick interrupt body. Returns `true` when the running thread's slice
    /// has expired and a switch should be pended.
    pub fn tick(&mut self) -> bool {
        self.control.tick();
        self.slice.expired(self.control.system_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::ThreadMask;

    #[test]
    fn test_tick_advances_clock() {
        let mut control = ScheduleControl::new();
        for _ in 0..5 {
            control.tick();
        }
        assert_eq!(control.system_time, 5);
    }

    #[test]
    fn test_clock_wraps() {
        let mut control = ScheduleControl::new();
        control.system_time = u32::MAX;
        control.tick();
        assert_eq!(control.system_time, 0);
    }

    #[test]
    fn test_delay_counts_down_to_ready() {
        let mut control = ScheduleControl::new();
        control.delay_current(3);
        assert!(!control.is_ready(0));

        control.tick();
        control.tick();
        assert!(control.delayed.contains(0));
        assert_eq!(control.delay_counters[0], 1);

        control.tick();
        assert!(control.delayed.is_empty());
        assert_eq!(control.delay_counters[0], 0);
        assert!(control.is_ready(0));
    }

    #[test]
    fn test_stale_counter_is_ignored() {
        let mut control = ScheduleControl::new();
        control.delay_counters[4] = 9;
        control.tick();
        assert_eq!(control.delay_counters[4], 9);
        assert_eq!(control.delayed, ThreadMask::EMPTY);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut control = ScheduleControl::new();
        control.delayed = ThreadMask::of(1) | ThreadMask::of(2);
        control.delay_counters[1] = 1;
        control.delay_counters[2] = 2;

        control.tick();
        assert!(!control.delayed.contains(1));
        assert!(control.delayed.contains(2));
        control.tick();
        assert!(control.delayed.is_empty());
    }

    #[test]
    fn test_slice_expires_after_full_slice() {
        let mut slice = SliceTimer::new();
        slice.arm(100);
        assert!(!slice.expired(100 + TIME_SLICE_TICKS - 1));
        assert!(slice.expired(100 + TIME_SLICE_TICKS));
    }

    #[test]
    fn test_slice_deadline_wraps() {
        let mut slice = SliceTimer::new();
        slice.arm(u32::MAX - 2);
        assert!(!slice.expired(u32::MAX));
        assert!(slice.expired(TIME_SLICE_TICKS - 3));
    }

    #[test]
    fn test_masked_slice_never_fires() {
        let mut slice = SliceTimer::new();
        assert!(!slice.expired(0));

        slice.arm(0);
        slice.mask();
        assert!(!slice.expired(1_000));

        // Overdue slice fires as soon as it is unmasked
        slice.unmask();
        assert!(slice.expired(1_000));
    }

    #[test]
    fn test_scheduler_tick_reports_expiry() {
        let mut scheduler = Scheduler::new();
        scheduler.slice.arm(0);
        for _ in 1..TIME_SLICE_TICKS {
            assert!(!scheduler.tick());
        }
        assert!(scheduler.tick());
        assert_eq!(scheduler.now(), TIME_SLICE_TICKS);
    }
}
