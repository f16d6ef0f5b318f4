/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The global serial console behind trait interfaces, so the kernel proper
//! never names a concrete UART.

use crate::sync::TrapCell;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Console interfaces.
pub mod interface {
    use core::fmt;

    /// Raw byte transport; what the UART driver must provide.
    pub trait SerialOps {
        /// Send one byte, blocking until there is room.
        fn write_byte(&self, byte: u8);

        /// Fetch one pending byte, if any. Never blocks.
        fn read_byte(&self) -> Option<u8>;
    }

    /// Console write functions.
    pub trait Write {
        /// Write a Rust format string.
        fn write_fmt(&self, args: fmt::Arguments) -> fmt::Result;
    }

    /// Character-level helpers on top of the raw transport.
    pub trait ConsoleOps: SerialOps {
        /// Send a character, expanding '\n' to "\r\n".
        fn write_char(&self, c: char) {
            if c == '\n' {
                self.write_byte(b'\r');
            }
            let mut bytes = [0u8; 4];
            for &b in c.encode_utf8(&mut bytes).as_bytes() {
                self.write_byte(b);
            }
        }

        /// Display a string.
        fn write_string(&self, string: &str) {
            for c in string.chars() {
                self.write_char(c);
            }
        }
    }

    /// Trait alias for a full-fledged console.
    pub trait All: Write + ConsoleOps {}
}

/// A sink that swallows everything; the console until a driver registers.
pub struct NullConsole;

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

pub static NULL_CONSOLE: NullConsole = NullConsole;

static CONSOLE: TrapCell<&'static (dyn interface::All + Sync)> = TrapCell::new(&NULL_CONSOLE);

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl interface::SerialOps for NullConsole {
    fn write_byte(&self, _byte: u8) {}

    fn read_byte(&self) -> Option<u8> {
        None
    }
}

impl interface::ConsoleOps for NullConsole {}

impl interface::Write for NullConsole {
    fn write_fmt(&self, _args: core::fmt::Arguments) -> core::fmt::Result {
        Ok(())
    }
}

impl interface::All for NullConsole {}

/// Register a new console.
pub fn register_console(new_console: &'static (dyn interface::All + Sync)) {
    CONSOLE.with(|con| *con = new_console);
}

/// Return a reference to the currently registered console.
///
/// This is the global console used by all printing macros and by the
/// GETCHAR system call.
pub fn console() -> &'static dyn interface::All {
    CONSOLE.with(|con| *con)
}
