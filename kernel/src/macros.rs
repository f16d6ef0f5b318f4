/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel print macros over the registered console.

/// Print into the kernel console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::macros::_print(format_args!($($arg)*)));
}

/// Print into the kernel console, with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ({
        $crate::macros::_print(format_args!($($arg)*));
        $crate::macros::_print(format_args!("\n"));
    })
}

/// Prints info text with a boot-relative microsecond timestamp.
#[macro_export]
macro_rules! info {
    ($string:expr) => ({
        let timestamp = $crate::macros::_uptime_us();

        $crate::println!(
            concat!("[  {:>4}.{:06}] ", $string),
            timestamp / 1_000_000,
            timestamp % 1_000_000,
        );
    });
    ($format_string:expr, $($arg:tt)*) => ({
        let timestamp = $crate::macros::_uptime_us();

        $crate::println!(
            concat!("[  {:>4}.{:06}] ", $format_string),
            timestamp / 1_000_000,
            timestamp % 1_000_000,
            $($arg)*
        );
    })
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use crate::console::{console, interface::Write};
    console().write_fmt(args).unwrap();
}

#[doc(hidden)]
pub fn _uptime_us() -> u64 {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "aarch64")] {
            crate::arch::time::now_us()
        } else {
            0
        }
    }
}
