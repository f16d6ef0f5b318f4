/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The Rigel kernel.
//!
//! A single-CPU preemptive kernel for the QEMU aarch64 `virt` board: a
//! two-regime virtual-memory manager, a weighted-fair scheduler, an
//! inode-backed namespace with per-process fifos, and a trap-driven
//! system-call surface.
//!
//! The kernel is re-entered only through its exception vector; asynchronous
//! exceptions stay masked between trap entry and the context restore, so no
//! kernel data structure needs a real lock. Everything architecture-neutral
//! lives in this library (and carries its unit tests); the vector table, the
//! register save/restore path and the device drivers sit behind
//! `cfg(target_arch = "aarch64")`.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
pub mod macros;

#[cfg(target_arch = "aarch64")]
pub mod arch;
pub mod console;
#[cfg(target_arch = "aarch64")]
pub mod drivers;
pub mod memory;
pub mod nsfs;
#[cfg(all(target_arch = "aarch64", not(test)))]
mod panic;
pub mod sched;
pub mod state;
pub mod sync;
pub mod syscall;
pub mod task;

/// Version banner printed at boot.
pub fn version() -> &'static str {
    concat!(
        env!("CARGO_PKG_NAME"),
        " version ",
        env!("CARGO_PKG_VERSION")
    )
}
