//! # Roundel Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time, there is no dynamic allocation. The scheduling strategy
//! itself is picked with the `preemptive` cargo feature.

/// Number of thread slots. Thread ids are `0..MAX_THREADS`.
/// Thread masks are 32 bits wide, so this can be raised up to 32.
pub const MAX_THREADS: usize = 8;

/// SysTick frequency in Hz. One tick is one millisecond; delays and
/// `millis()` are counted in ticks.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Length of a preemptive time slice, in ticks. Only used with the
/// `preemptive` feature.
pub const TIME_SLICE_TICKS: u32 = 16;

/// Default per-thread stack size in bytes.
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// Stack size of each thread slot, in bytes.
///
/// Slot 0 is carved out of the top of the boot stack; the remaining slots
/// live in a static arena. Every entry must leave room for the deepest call
/// chain plus one saved context frame.
pub const STACK_SIZES: [usize; MAX_THREADS] = [DEFAULT_STACK_SIZE; MAX_THREADS];

/// Size of the main stack used by exception handlers and the scheduler
/// once thread 0 has taken over the boot stack.
pub const KERNEL_STACK_SIZE: usize = 2048;

/// Sentinel byte written at the lowest address of every thread stack.
pub const CANARY: u8 = 0xAA;

/// Toggle period of the fault indicator after a stack overflow.
pub const STACK_OVERFLOW_BLINK_MS: u32 = 250;

/// Toggle period of the fault indicator after an uninitialized thread ran.
pub const UNINITIALIZED_BLINK_MS: u32 = 1000;

const _: () = assert!(MAX_THREADS > 0 && MAX_THREADS <= 32);
const _: () = assert!(TIME_SLICE_TICKS > 0);
