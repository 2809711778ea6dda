//! # Roundel
//!
//! A tiny round-robin thread kernel for ARM Cortex-M4 microcontrollers.
//!
//! ## Overview
//!
//! Roundel runs a fixed, compile-time set of threads on a single core. Each
//! thread owns a private stack and a slot in the thread table. Scheduling is
//! strictly circular: every ready thread gets a turn before any thread runs
//! twice, and there are no priorities.
//!
//! Two switch strategies are available:
//!
//! - **Cooperative** (default): threads give up the CPU in `yield_now`,
//!   `delay` or by disabling themselves.
//! - **Preemptive** (`preemptive` feature): additionally, a time slice of
//!   `TIME_SLICE_TICKS` milliseconds ends the running thread's turn via
//!   PendSV. `lock`/`unlock` hold off preemption around short sections.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Threads                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │  initialize · create_thread · enable/disable · delay   │
//! ├──────────────┬─────────────────────┬──────────────────┤
//! │  Scheduler   │   Tick driver       │  Sync            │
//! │  scheduler.rs│   tick.rs           │  sync.rs         │
//! │  ─ create()  │   ─ tick()          │  ─ Shared<T>     │
//! │  ─ switch_*  │   ─ SliceTimer      │                  │
//! ├──────────────┴─────────────────────┴──────────────────┤
//! │   Thread table (thread.rs) · Masks (mask.rs)           │
//! │   Stacks + canary (stack.rs) · Frames (context.rs)     │
//! ├────────────────────────────────────────────────────────┤
//! │   Port seam (arch/mod.rs) · switch_context · Platform  │
//! │   Cortex-M4 port (arch/cortex_m4.rs)                   │
//! │   SysTick · PendSV · yield · boot stack handover       │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed thread table**: `[ThreadControl; MAX_THREADS]`
//! - **Per-thread stacks**: sizes from `config::STACK_SIZES`; thread 0 keeps
//!   the top of the boot stack, the others live in a static arena
//! - **Critical sections**: `cortex_m::interrupt::free()` for shared state
//!
//! Everything except the port layer, the global kernel instance and the
//! critical section wrapper is plain Rust and is unit tested on the host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

pub mod arch;
pub mod config;
pub mod context;
pub mod errors;
pub mod mask;
pub mod scheduler;
pub mod stack;
pub mod thread;
pub mod tick;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;

#[cfg(test)]
mod sim;

pub use errors::{FaultIndicator, KernelFault};
pub use mask::{ThreadId, ThreadMask};
pub use thread::EntryPoint;
