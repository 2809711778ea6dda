//! # Scheduler
//!
//! Round-robin scheduling over the fixed thread table.
//!
//! ## Scheduling Algorithm
//!
//! Every switch, with interrupts disabled:
//! 1. **Switch out**: mask the time-slice channel, verify the outgoing
//!    thread's canary, then store its stack pointer (or, if the thread was
//!    re-created while running, replace its context with a fresh frame)
//! 2. **Ready set**: `ready = !(disabled | delayed)`
//! 3. **Idle**: if nothing is ready, park the CPU until an interrupt and
//!    recompute (see [`crate::arch::switch_context`])
//! 4. **Select**: walk ids in circular order starting just after the
//!    previous current thread; the first ready one wins
//! 5. **Switch in**: hand its saved stack pointer to the port layer and, in
//!    the preemptive build, arm a new time slice
//!
//! There are no priorities. Every ready thread gets its turn before any
//! thread runs twice.
//!
//! ## State Machine
//!
//! ```text
//!                 select                   yield / slice end
//!   ┌───────┐ ─────────────► ┌─────────┐ ───────────────────┐
//!   │ Ready │                │ Running │                     │
//!   └───────┘ ◄───────────── └─────────┘ ◄───────────────────┘
//!     ▲   ▲   delay expiry /      │
//!     │   │   enable              │ delay / disable
//!     │   │                  ┌──────────────────┐
//!     │   └───────────────── │ Delayed/Disabled │
//!     │                      └──────────────────┘
//!     └── create (fresh frame, from any state)
//! ```

use crate::config::MAX_THREADS;
use crate::errors::KernelFault;
use crate::mask::{ThreadId, ThreadMask};
use crate::stack::StackRegion;
use crate::thread::{EntryPoint, ThreadTable};
use crate::tick::SliceTimer;

// ---------------------------------------------------------------------------
// Schedule Control Block
// ---------------------------------------------------------------------------

/// Aggregate scheduling state shared by threads and the tick interrupt.
#[derive(Debug, Clone)]
pub struct ScheduleControl {
    /// Threads that are paused and not eligible to run.
    pub disabled: ThreadMask,

    /// Threads sleeping on a delay.
    pub delayed: ThreadMask,

    /// Remaining milliseconds per thread. Meaningful only while the
    /// thread's `delayed` bit is set.
    pub delay_counters: [u16; MAX_THREADS],

    /// Running thread.
    pub current: ThreadId,

    /// Always `ThreadMask::of(current)`.
    pub current_mask: ThreadMask,

    /// Monotonic millisecond counter, advanced only by the tick.
    pub system_time: u32,

    /// The running thread was re-created; its next switch-out must discard
    /// the live context and stage a fresh one.
    pub restart_pending: bool,
}

impl ScheduleControl {
    /// Boot state: thread 0 running, every other thread disabled.
    pub const fn new() -> Self {
        Self {
            disabled: ThreadMask::all_except(0),
            delayed: ThreadMask::EMPTY,
            delay_counters: [0; MAX_THREADS],
            current: 0,
            current_mask: ThreadMask::of(0),
            system_time: 0,
            restart_pending: false,
        }
    }

    /// Threads that are neither disabled nor delayed.
    #[inline]
    pub fn ready(&self) -> ThreadMask {
        !(self.disabled | self.delayed)
    }

    #[inline]
    pub fn is_ready(&self, id: ThreadId) -> bool {
        self.ready().contains(id)
    }

    /// Make `id` the running thread.
    #[inline]
    fn set_current(&mut self, id: ThreadId) {
        self.current = id;
        self.current_mask = ThreadMask::of(id);
    }

    /// Put the running thread to sleep for `millis` ticks.
    ///
    /// A zero delay leaves the thread ready: the caller still switches, so it
    /// behaves as a plain yield.
    pub fn delay_current(&mut self, millis: u16) {
        if millis == 0 {
            return;
        }
        self.delay_counters[self.current] = millis;
        self.delayed = self.delayed | self.current_mask;
    }
}

impl Default for ScheduleControl {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// All kernel state: the thread table, the schedule control block and the
/// time-slice channel. One instance lives for the whole program in
/// `kernel.rs`; every access happens inside a critical section.
pub struct Scheduler {
    pub threads: ThreadTable,
    pub control: ScheduleControl,
    pub slice: SliceTimer,
}

// Safety: the thread table holds raw pointers into the thread stacks. The
// scheduler is only reached through an interrupt-masking mutex.
unsafe impl Send for Scheduler {}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            threads: ThreadTable::new(),
            control: ScheduleControl::new(),
            slice: SliceTimer::new(),
        }
    }

    /// Bind every slot to its stack and reset the schedule to the boot
    /// state: thread 0 current and the only enabled thread.
    pub fn init(&mut self, regions: [StackRegion; MAX_THREADS]) {
        self.threads.init(regions);
        self.control = ScheduleControl::new();
        self.slice = SliceTimer::new();
        kinfo!("scheduler initialized with {} thread slots", MAX_THREADS);
    }

    /// Running thread.
    #[inline]
    pub fn current(&self) -> ThreadId {
        self.control.current
    }

    /// Milliseconds since boot.
    #[inline]
    pub fn now(&self) -> u32 {
        self.control.system_time
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// (Re)create thread `id` so that it starts at `entry`.
    ///
    /// Returns `true` when `id` is the running thread. The caller must then
    /// switch away immediately and never return to its call site: the fresh
    /// frame is staged during that switch-out, once execution has left the
    /// thread's stack.
    pub fn create(&mut self, id: ThreadId, entry: EntryPoint, enabled: bool) -> bool {
        debug_assert!(id < MAX_THREADS);
        let restart = id == self.control.current;

        let slot = self.threads.get_mut(id);
        slot.created = true;
        if restart {
            slot.entry = entry;
        } else {
            slot.reset(entry);
        }

        self.control.disabled.set(id, !enabled);
        self.control.delayed.remove(id);
        self.control.restart_pending |= restart;

        kdebug!("thread {} created, enabled: {}", id, enabled);
        restart
    }

    /// Make thread `id` eligible for scheduling.
    pub fn enable(&mut self, id: ThreadId) {
        self.control.disabled.remove(id);
        ktrace!("thread {} enabled", id);
    }

    /// Pause thread `id`. Returns `true` when `id` is the running thread,
    /// which must then switch away.
    pub fn disable(&mut self, id: ThreadId) -> bool {
        self.control.disabled.insert(id);
        ktrace!("thread {} disabled", id);
        id == self.control.current
    }

    /// Put the running thread to sleep for at least `millis` milliseconds.
    /// The caller must switch away afterwards.
    pub fn delay(&mut self, millis: u16) {
        self.control.delay_current(millis);
    }

    /// Mask the time-slice channel so the running thread is not preempted.
    pub fn lock(&mut self) {
        self.slice.mask();
    }

    /// Unmask the time-slice channel.
    pub fn unlock(&mut self) {
        self.slice.unmask();
    }

    // -----------------------------------------------------------------------
    // Switch steps
    // -----------------------------------------------------------------------

    /// Record the outgoing thread's context.
    ///
    /// `sp` is the stack pointer left after the port layer pushed the
    /// thread's registers. A corrupted canary is reported before anything
    /// is stored; the thread must then never be resumed.
    pub fn switch_out(&mut self, sp: *mut usize) -> Result<(), KernelFault> {
        self.slice.mask();

        let id = self.control.current;
        let slot = self.threads.get_mut(id);
        if !slot.canary_intact() {
            return Err(KernelFault::StackOverflow(id));
        }

        if self.control.restart_pending {
            self.control.restart_pending = false;
            let entry = slot.entry;
            slot.reset(entry);
        } else {
            slot.stack_pointer = sp;
        }
        Ok(())
    }

    /// Pick the next ready thread in round-robin order and make it current.
    /// Returns `None` when no thread is ready.
    pub fn select_next(&mut self) -> Option<ThreadId> {
        let next = self.control.ready().next_after(self.control.current)?;
        self.control.set_current(next);
        Some(next)
    }

    /// Stack pointer to restore for the thread picked by
    /// [`select_next`](Self::select_next). Starts a new time slice in the
    /// preemptive build.
    pub fn switch_in(&mut self) -> *mut usize {
        if cfg!(feature = "preemptive") {
            self.slice.arm(self.control.system_time);
        }
        self.threads.get(self.control.current).stack_pointer
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextFrame;
    use crate::sim::Sim;

    extern "C" fn worker() -> ! {
        loop {}
    }

    extern "C" fn replacement() -> ! {
        loop {}
    }

    fn resume_address(sim: &Sim, id: ThreadId) -> usize {
        let sp = sim.scheduler.threads.get(id).stack_pointer;
        unsafe { (*(sp as *const ContextFrame)).resume_address() & !1 }
    }

    #[test]
    fn test_boot_state() {
        let sim = Sim::new();
        let control = &sim.scheduler.control;
        assert_eq!(control.current, 0);
        assert_eq!(control.current_mask, ThreadMask::of(0));
        assert_eq!(control.ready(), ThreadMask::of(0));
        assert_eq!(sim.scheduler.now(), 0);
    }

    #[test]
    fn test_create_other_thread() {
        let mut sim = Sim::new();
        assert!(!sim.scheduler.create(2, worker, true));
        assert!(sim.scheduler.control.is_ready(2));
        assert!(sim.scheduler.threads.get(2).created);
        assert_eq!(resume_address(&sim, 2), worker as EntryPoint as usize & !1);

        assert!(!sim.scheduler.create(3, worker, false));
        assert!(!sim.scheduler.control.is_ready(3));
    }

    #[test]
    fn test_create_clears_stale_delay() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.switch_to(1);
        sim.scheduler.delay(100);
        sim.switch();
        assert!(sim.scheduler.control.delayed.contains(1));

        sim.scheduler.create(1, worker, true);
        assert!(sim.scheduler.control.is_ready(1));
    }

    #[test]
    fn test_recreate_current_thread_resumes_at_new_entry() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.switch_to(1);

        assert!(sim.scheduler.create(1, replacement, true));
        // Whatever the live stack pointer was, it must not be kept
        let next = sim.switch_with_sp(core::ptr::null_mut()).unwrap();
        assert_eq!(next, 0);
        assert!(!sim.scheduler.control.restart_pending);
        assert_eq!(resume_address(&sim, 1), replacement as EntryPoint as usize & !1);

        // Next turn of thread 1 starts the new entry point
        assert_eq!(sim.switch().unwrap(), 1);
    }

    #[test]
    fn test_recreate_current_disabled_never_runs() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        assert!(sim.scheduler.create(0, replacement, false));
        assert_eq!(sim.switch().unwrap(), 1);
        assert_eq!(sim.switch().unwrap(), 1);
        assert_eq!(resume_address(&sim, 0), replacement as EntryPoint as usize & !1);
    }

    #[test]
    fn test_disable_current_requests_switch() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        assert!(!sim.scheduler.disable(1));
        assert!(sim.scheduler.disable(0));
        sim.scheduler.enable(1);
        assert_eq!(sim.switch().unwrap(), 1);
    }

    #[test]
    fn test_delay_zero_is_a_yield() {
        let mut sim = Sim::new();
        sim.scheduler.delay(0);
        assert!(sim.scheduler.control.delayed.is_empty());
        assert_eq!(sim.switch().unwrap(), 0);
        assert_eq!(sim.waits, 0);
    }

    #[test]
    fn test_switch_out_stores_stack_pointer() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        let live = sim.scheduler.threads.get(0).canary.wrapping_add(64) as *mut usize;
        assert_eq!(sim.switch_with_sp(live).unwrap(), 1);
        assert_eq!(sim.scheduler.threads.get(0).stack_pointer, live);
    }

    #[test]
    fn test_stack_overflow_is_detected_and_not_resumed() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.switch_to(1);
        let saved = sim.scheduler.threads.get(1).stack_pointer;

        unsafe { *sim.scheduler.threads.get(1).canary = 0x00 };
        assert_eq!(sim.switch(), Err(KernelFault::StackOverflow(1)));

        // Nothing moved: the corrupted thread's context is not touched
        assert_eq!(sim.scheduler.current(), 1);
        assert_eq!(sim.scheduler.threads.get(1).stack_pointer, saved);
    }

    #[test]
    fn test_overflow_in_other_thread_found_when_it_switches_out() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        unsafe { *sim.scheduler.threads.get(1).canary = 0x55 };

        // Thread 0 is fine, so switching away from it works
        assert_eq!(sim.switch().unwrap(), 1);
        // The very next switch involving thread 1 catches it
        assert_eq!(sim.switch(), Err(KernelFault::StackOverflow(1)));
    }

    #[test]
    fn test_round_robin_selection_is_circular() {
        // Every ready set, from every current thread
        for ready_bits in 1..=ThreadMask::ALL.bits() {
            for current in 0..MAX_THREADS {
                let mut scheduler = Scheduler::new();
                scheduler.control.disabled = !ThreadMask::from_bits(ready_bits);
                scheduler.control.set_current(current);

                let picked = scheduler.select_next().unwrap();
                assert!(scheduler.control.ready().contains(picked));
                assert_eq!(scheduler.control.current_mask, ThreadMask::of(picked));

                // No ready thread lies strictly between current and picked
                let mut id = (current + 1) % MAX_THREADS;
                while id != picked {
                    assert!(!scheduler.control.is_ready(id));
                    id = (id + 1) % MAX_THREADS;
                }
            }
        }
    }

    #[test]
    fn test_no_ready_thread_selects_nothing() {
        let mut scheduler = Scheduler::new();
        scheduler.control.disabled = ThreadMask::ALL;
        assert_eq!(scheduler.select_next(), None);
        assert_eq!(scheduler.current(), 0);
    }

    #[test]
    fn test_continuously_ready_threads_alternate() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.scheduler.create(2, worker, true);

        let order: std::vec::Vec<_> = (0..6).map(|_| sim.switch().unwrap()).collect();
        assert_eq!(order, [1, 2, 0, 1, 2, 0]);
    }
}
