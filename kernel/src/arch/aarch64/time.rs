/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The generic timer: a monotonic microsecond clock and the one-shot
//! preemption deadline.

use aarch64_cpu::registers::{CNTFRQ_EL0, CNTPCT_EL0, CNTP_CTL_EL0, CNTP_TVAL_EL0};
use tock_registers::interfaces::{Readable, Writeable};

/// Microseconds since counter reset. Split into quotient and remainder so
/// the multiplication cannot overflow for any realistic counter frequency.
pub fn now_us() -> u64 {
    let frequency = CNTFRQ_EL0.get();
    let count = CNTPCT_EL0.get();
    (count / frequency) * 1_000_000 + (count % frequency) * 1_000_000 / frequency
}

/// Arm the EL1 physical timer to fire in `us` microseconds. The deadline is
/// floored at 1000 counter ticks so a tiny slice cannot fire before the
/// ERET completes.
pub fn set_timeout_us(us: u64) {
    let frequency = CNTFRQ_EL0.get();
    let ticks = (frequency * us / 1_000_000).max(1000);

    CNTP_TVAL_EL0.set(ticks);
    CNTP_CTL_EL0.write(CNTP_CTL_EL0::ENABLE::SET + CNTP_CTL_EL0::IMASK::CLEAR);
}
