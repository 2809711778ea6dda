//! # Architecture Abstraction Layer
//!
//! The boundary between the portable scheduler and the processor. The
//! scheduler never touches registers or interrupt state directly; the port
//! layer saves registers, hands over the outgoing stack pointer, and loads
//! whatever stack pointer comes back.
//!
//! [`switch_context`] is the complete scheduling step shared by every port.
//! Ports implement [`Platform`] to give it access to the kernel state and a
//! way to park the CPU while no thread is ready. Only the Cortex-M4 port
//! exists today; the host test harness provides a simulated one.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

use crate::errors::KernelFault;
use crate::scheduler::Scheduler;

/// What the scheduling step needs from a port.
pub trait Platform {
    /// Run `f` with exclusive access to the kernel state.
    fn with_scheduler<R>(&mut self, f: impl FnOnce(&mut Scheduler) -> R) -> R;

    /// Sleep until at least one interrupt has been taken. The tick interrupt
    /// must be able to run (and release delayed threads) during this call.
    fn wait_for_interrupt(&mut self);
}

/// One full context switch, from saved outgoing stack pointer to the stack
/// pointer of the thread to resume.
///
/// Called by the port layer with interrupts disabled, once the outgoing
/// thread's registers are on its stack. If no thread is ready the CPU idles
/// here, on the kernel stack, until the tick readies one. Time keeps flowing
/// while idling.
///
/// An `Err` means the outgoing thread overflowed its stack; the port must
/// halt rather than resume anything.
pub fn switch_context<P: Platform>(
    platform: &mut P,
    sp: *mut usize,
) -> Result<*mut usize, KernelFault> {
    platform.with_scheduler(|s| s.switch_out(sp))?;

    loop {
        if let Some(next) = platform.with_scheduler(Scheduler::select_next) {
            ktrace!("switch to thread {}", next);
            break;
        }
        platform.wait_for_interrupt();
    }

    Ok(platform.with_scheduler(Scheduler::switch_in))
}

/// Stop the system and signal `fault` forever.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn halt(fault: KernelFault) -> ! {
    cortex_m4::signal_fault(fault)
}

/// Stop the system and signal `fault` forever.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub fn halt(fault: KernelFault) -> ! {
    panic!("kernel fault: {fault}")
}

// ---------------------------------------------------------------------------
// Scheduling behaviour, driven through the simulated port
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use crate::config::{MAX_THREADS, TIME_SLICE_TICKS};
    use crate::mask::ThreadId;
    use crate::sim::Sim;

    extern "C" fn worker() -> ! {
        loop {}
    }

    fn create_all(sim: &mut Sim) {
        for id in 1..MAX_THREADS {
            sim.scheduler.create(id, worker, true);
        }
    }

    #[test]
    fn test_every_ready_thread_runs_once_per_round() {
        let mut sim = Sim::new();
        create_all(&mut sim);

        for _round in 0..4 {
            let mut seen: Vec<ThreadId> = (0..MAX_THREADS).map(|_| sim.switch().unwrap()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..MAX_THREADS).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_delay_is_a_lower_bound() {
        for millis in [0u16, 1, 50, u16::MAX] {
            let mut sim = Sim::new();
            sim.scheduler.create(1, worker, true);
            sim.switch_to(1);

            let start = sim.scheduler.now();
            sim.scheduler.delay(millis);
            assert_eq!(sim.switch().unwrap(), 0);

            // Thread 0 keeps the CPU busy, one tick per turn
            while sim.scheduler.current() != 1 {
                sim.advance(1);
                sim.switch().unwrap();
            }
            let slept = sim.scheduler.now() - start;
            assert!(slept >= u32::from(millis), "delay({millis}) woke after {slept}");
            assert!(slept <= u32::from(millis) + 1);
        }
    }

    #[test]
    fn test_disabled_threads_never_run() {
        let mut sim = Sim::new();
        create_all(&mut sim);

        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;

            // Thread 0 stays enabled so there is always someone to run
            let id = 1 + (seed as usize % (MAX_THREADS - 1));
            if seed & 0x100 != 0 {
                sim.scheduler.disable(id);
            } else {
                sim.scheduler.enable(id);
            }

            let next = sim.switch().unwrap();
            assert!(!sim.scheduler.control.disabled.contains(next));
        }
    }

    #[test]
    fn test_idle_until_delay_expires() {
        let mut sim = Sim::new();
        sim.scheduler.delay(10);

        assert_eq!(sim.switch().unwrap(), 0);
        assert_eq!(sim.waits, 10);
        assert_eq!(sim.scheduler.now(), 10);
    }

    #[test]
    fn test_delay_timeline() {
        const DELAYS: [u16; 3] = [5, 3, 7];

        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.scheduler.create(2, worker, true);

        let mut trace = Vec::new();
        while sim.scheduler.now() <= 20 {
            let id = sim.scheduler.current();
            trace.push((sim.scheduler.now(), id));
            sim.scheduler.delay(DELAYS[id]);
            sim.switch().unwrap();
        }

        assert_eq!(
            trace,
            [
                (0, 0),
                (0, 1),
                (0, 2),
                (3, 1),
                (5, 0),
                (6, 1),
                (7, 2),
                (9, 1),
                (10, 0),
                (12, 1),
                (14, 2),
                (15, 0),
                (15, 1),
                (18, 1),
                (20, 0),
            ]
        );
    }

    #[test]
    fn test_slice_expiry_depends_on_strategy() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.switch().unwrap();

        assert!(!sim.advance(TIME_SLICE_TICKS - 1));
        assert_eq!(sim.advance(1), cfg!(feature = "preemptive"));
    }

    #[cfg(feature = "preemptive")]
    #[test]
    fn test_lock_holds_off_preemption() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.switch().unwrap();

        sim.scheduler.lock();
        assert!(!sim.advance(10 * TIME_SLICE_TICKS));
        sim.scheduler.unlock();
        assert!(sim.advance(1));
    }

    #[cfg(feature = "preemptive")]
    #[test]
    fn test_switch_starts_fresh_slice() {
        let mut sim = Sim::new();
        sim.scheduler.create(1, worker, true);
        sim.switch().unwrap();
        sim.advance(TIME_SLICE_TICKS - 1);

        sim.switch().unwrap();
        assert!(!sim.advance(TIME_SLICE_TICKS - 1));
        assert!(sim.advance(1));
    }
}
