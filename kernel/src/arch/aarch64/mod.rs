/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! AArch64: the exception vector, the context save/restore pair, the
//! translation-base plumbing and the generic timer.

pub mod exception;
pub mod mmu;
pub mod time;

use aarch64_cpu::asm;

/// Park the core.
pub fn endless_sleep() -> ! {
    loop {
        asm::wfe();
    }
}
