/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The Rigel user-space runtime.
//!
//! Programs link this library and provide `extern "C" fn main() -> i64`.
//! The runtime entry maps the first heap page, brings up the paged
//! allocator, binds handles 0 and 1 to the process's `/proc` stdin/stdout
//! fifos, runs `main` and exits.

#![no_std]

extern crate alloc;

pub mod arch;
pub mod io;
pub mod runtime;
pub mod syscall;

pub use rigel_base::syscall::{NodeKind, NodeStat, OpenMode, TaskState};
