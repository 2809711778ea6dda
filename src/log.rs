//! # Logging
//!
//! Kernel log macros. With the `defmt` feature they forward to the matching
//! `defmt` macro (transported over RTT by `defmt-rtt`); without it they
//! compile to nothing, so logging costs no flash or cycles in a bare build.
//!
//! Format strings use the `{}` placeholder subset both backends accept.
//!
//! ```ignore
//! kdebug!("thread {} created", id);
//! ```

#[cfg(feature = "defmt")]
macro_rules! ktrace {
    ($($arg:tt)+) => { defmt::trace!($($arg)+) };
}

#[cfg(feature = "defmt")]
macro_rules! kdebug {
    ($($arg:tt)+) => { defmt::debug!($($arg)+) };
}

#[cfg(feature = "defmt")]
macro_rules! kinfo {
    ($($arg:tt)+) => { defmt::info!($($arg)+) };
}

#[cfg(feature = "defmt")]
macro_rules! kerror {
    ($($arg:tt)+) => { defmt::error!($($arg)+) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! ktrace {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! kdebug {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! kinfo {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! kerror {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}
