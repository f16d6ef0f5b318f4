/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Exception entry and exit.
//!
//! The vector stubs (vectors.S) save the user context onto the task's
//! kernel stack and branch here. The dispatcher commits the frame into the
//! current task's PCB, classifies the exception via the syndrome register,
//! runs the matching kernel handler to completion, and leaves through
//! [`restore_context`] into whichever task is executing afterwards.
//! Asynchronous exceptions stay masked the whole way through.

use aarch64_cpu::{
    asm::barrier,
    registers::{ESR_EL1, FAR_EL1, VBAR_EL1},
};
use tock_registers::interfaces::{Readable, Writeable};

use rigel_base::defs::platform::TIMER_IRQ;

use crate::drivers::{self, interface::InterruptController};
use crate::state::{Kernel, Resume, KERNEL, SCHEDULING_SLICE_US};
use crate::task::Context;

use super::{mmu, time};

core::arch::global_asm!(include_str!("vectors.S"));

extern "C" {
    static rigel_vector_table: core::cell::UnsafeCell<()>;

    fn rigel_eret_to_user(regs: *const u64, spsr: u64, elr: u64, usp: u64, ksp: u64) -> !;
}

/// Install the vector table. The table must be 2 KiB aligned.
pub fn init() {
    let base = unsafe { rigel_vector_table.get() as u64 };
    assert!(base.trailing_zeros() >= 11, "vector table misaligned");

    VBAR_EL1.set(base);

    // Force the VBAR update to complete before the next instruction.
    barrier::isb(barrier::SY);
}

/// Common landing point of all sixteen vector entries.
#[no_mangle]
unsafe extern "C" fn rigel_exception(arg0: u64, arg1: u64, frame: *const Context, source: u64) -> ! {
    let now_us = time::now_us();

    let resume = KERNEL.with(|cell| {
        let kernel = cell.get_mut().expect("exception before kernel init");
        kernel.commit_frame(unsafe { &*frame });
        dispatch(kernel, arg0, arg1, source, now_us);
        kernel.resume()
    });

    restore_context(resume)
}

fn dispatch(kernel: &mut Kernel, arg0: u64, arg1: u64, source: u64, now_us: u64) {
    // Rows 1, 5, 9, 13 of the vector table are IRQ entries.
    if source % 4 == 1 {
        match drivers::gic().acknowledge() {
            Some(irq) if irq == TIMER_IRQ => {
                drivers::gic().complete(irq);
                kernel.on_timer(now_us);
            }
            Some(irq) => panic!("unexpected interrupt {}", irq),
            // Spurious; resume whoever was running.
            None => {}
        }
        return;
    }

    match ESR_EL1.read_as_enum(ESR_EL1::EC) {
        Some(ESR_EL1::EC::Value::SVC64) => kernel.on_syscall(arg0, arg1, now_us),
        Some(ESR_EL1::EC::Value::DataAbortLowerEL) => kernel.on_data_abort(FAR_EL1.get()),
        _ => panic!(
            "unhandled exception: source={} esr={:#x} elr={:#x}",
            source,
            ESR_EL1.get(),
            kernel.current().context.pc,
        ),
    }
}

/// Exit to user space: activate the task's translation, re-arm the
/// preemption timer and restore the saved registers.
pub fn restore_context(mut resume: Resume) -> ! {
    mmu::activate_user(resume.ttbr0_pa);
    time::set_timeout_us(SCHEDULING_SLICE_US);

    let regs = core::ptr::addr_of_mut!(resume.regs) as *const u64;
    unsafe { rigel_eret_to_user(regs, resume.spsr, resume.pc, resume.usp, resume.ksp) }
}
