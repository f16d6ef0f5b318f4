/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The kernel panic handler.

use core::panic::PanicInfo;

use qemu_exit::QEMUExit;

#[panic_handler]
fn panicked(info: &PanicInfo) -> ! {
    // Protect against panic loops if the printing below panics itself.
    panic_prevent_reenter();

    crate::println!("\nKernel panic!\n\n{}", info);

    qemu_exit::AArch64::new().exit_failure()
}

/// Stop immediately if called a second time.
fn panic_prevent_reenter() {
    use core::sync::atomic::{AtomicBool, Ordering};

    static PANIC_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

    if !PANIC_IN_PROGRESS.swap(true, Ordering::Relaxed) {
        return;
    }

    crate::arch::endless_sleep()
}
