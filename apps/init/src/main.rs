/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! First task. Forks the terminal multiplexer and parks.

#![no_std]
#![no_main]

use rigel_user::{kprintln, syscall};

#[no_mangle]
extern "C" fn main() -> i64 {
    kprintln!("init: up");

    let pid = syscall::fork();
    if pid == 0 {
        syscall::exec("/app/ttymux");
        kprintln!("init: cannot start /app/ttymux");
        return 1;
    }

    loop {
        syscall::sleep_us(1_000_000);
    }
}
