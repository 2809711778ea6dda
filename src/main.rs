//! # Roundel Demo Firmware
//!
//! Three threads sharing the CPU round-robin on an STM32F4 board with the
//! user LED on PA5 (e.g. NUCLEO-F401RE):
//!
//! | Thread | Entry | Behaviour |
//! |--------|-------|-----------|
//! | 0 | `main` | Creates the others, then reports uptime every second |
//! | 1 | `blinker` | Toggles the LED every 250 ms |
//! | 2 | `worker` | Busy bursts; pauses the blinker for a while every 5 s |
//!
//! The same LED doubles as the fault indicator: after a kernel fault it
//! blinks at the fault's own rate with interrupts masked.
//!
//! Build with `--features demo` (add `defmt` for RTT logging, `preemptive`
//! for time slicing).

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

#[cfg(feature = "defmt")]
use defmt_rtt as _;

use roundel::kernel;

// ---------------------------------------------------------------------------
// Board LED (GPIOA pin 5)
// ---------------------------------------------------------------------------

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const GPIOA_MODER: *mut u32 = 0x4002_0000 as *mut u32;
const GPIOA_BSRR: *mut u32 = 0x4002_0018 as *mut u32;
const LED_PIN: u32 = 5;

fn led_init() {
    unsafe {
        // Clock GPIOA, then make PA5 a push-pull output
        let enr = core::ptr::read_volatile(RCC_AHB1ENR);
        core::ptr::write_volatile(RCC_AHB1ENR, enr | 1);
        let moder = core::ptr::read_volatile(GPIOA_MODER) & !(0b11 << (LED_PIN * 2));
        core::ptr::write_volatile(GPIOA_MODER, moder | (0b01 << (LED_PIN * 2)));
    }
}

fn led(on: bool) {
    let bit = if on { 1 << LED_PIN } else { 1 << (LED_PIN + 16) };
    unsafe { core::ptr::write_volatile(GPIOA_BSRR, bit) };
}

// ---------------------------------------------------------------------------
// Thread entry points
// ---------------------------------------------------------------------------

extern "C" fn blinker() -> ! {
    let mut on = false;
    loop {
        on = !on;
        led(on);
        kernel::delay(250);
    }
}

extern "C" fn worker() -> ! {
    let mut last_pause = kernel::millis();
    loop {
        // A burst of computation, then let the others run
        let mut acc: u32 = 0;
        for i in 0..10_000u32 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        core::hint::black_box(acc);

        if kernel::millis().wrapping_sub(last_pause) >= 5_000 {
            last_pause = kernel::millis();
            kernel::disable_thread(1);
            kernel::delay(1_000);
            kernel::enable_thread(1);
        }

        #[cfg(not(feature = "preemptive"))]
        kernel::yield_now();
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Becomes thread 0 once the kernel is up.
#[entry]
fn main() -> ! {
    let Some(cp) = cortex_m::Peripherals::take() else {
        loop {
            cortex_m::asm::wfi();
        }
    };
    led_init();

    kernel::initialize(cp, Some(led));
    kernel::create_thread(1, blinker, true);
    kernel::create_thread(2, worker, true);

    loop {
        kernel::delay(1_000);
        #[cfg(feature = "defmt")]
        defmt::info!("uptime {} ms", kernel::millis());
    }
}
