//! # Synchronization Primitives
//!
//! Interrupt-safe access to kernel state shared between threads and the
//! SysTick/PendSV handlers. There is a single core, so masking interrupts is
//! enough to make any access exclusive.

use core::cell::RefCell;

use cortex_m::interrupt::{self, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// The previous interrupt state is restored on exit, so nesting inside the
/// scheduler's own interrupts-off regions is fine.
///
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

/// A value that may only be touched inside a critical section.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// Panics if called again from inside `f`; `f` must not enable
    /// interrupts or re-enter the kernel.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }
}
