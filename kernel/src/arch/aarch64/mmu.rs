/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Translation-base plumbing.

use aarch64_cpu::{
    asm::barrier,
    registers::{TTBR0_EL1, TTBR1_EL1},
};
use tock_registers::interfaces::Writeable;

use crate::memory::Regime;

/// Point the regime's translation base register at a table tree and flush
/// stale translations.
pub fn activate(regime: Regime, base_pa: u64) {
    match regime {
        Regime::Kernel => TTBR1_EL1.set_baddr(base_pa),
        Regime::User => TTBR0_EL1.set_baddr(base_pa),
    }

    // SAFETY: Invalidating translations has no soundness impact beyond the
    // barriers below.
    unsafe { core::arch::asm!("tlbi vmalle1") };
    barrier::dsb(barrier::SY);
    barrier::isb(barrier::SY);
}

pub fn activate_user(base_pa: u64) {
    activate(Regime::User, base_pa);
}
