/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Shared foundation of the Rigel kernel and its user runtime.
//!
//! Everything in here is linked into both privileged and unprivileged
//! binaries: the system-call ABI, the user memory map, the free-list
//! allocator core and the on-medium directory-entry codec. Keep this crate
//! free of anything that only makes sense on one side of the trap boundary.

#![no_std]

pub mod align;
pub mod defs;
pub mod dirent;
pub mod heap;
pub mod syscall;
