/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Terminal multiplexer: the bridge between the serial console and the
//! shell's stdin/stdout fifos. Runs entirely in user space; the kernel only
//! provides the fifos and the GETCHAR/PUTCHAR calls.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::format;

use rigel_user::{kprintln, syscall, OpenMode};

#[no_mangle]
extern "C" fn main() -> i64 {
    let shell = syscall::fork();
    if shell == 0 {
        syscall::exec("/app/shell");
        kprintln!("ttymux: cannot start /app/shell");
        return 1;
    }

    let shell_in = open_retrying(&format!("/proc/{}/fifo/stdin", shell), OpenMode::Write);
    let shell_out = open_retrying(&format!("/proc/{}/fifo/stdout", shell), OpenMode::Read);

    let mut buffer = [0u8; 512];
    loop {
        // Console -> shell.
        while let Some(byte) = syscall::kgetchar() {
            syscall::write(shell_in, &[byte]);
        }

        // Shell -> console.
        let n = syscall::read(shell_out, &mut buffer);
        for &byte in buffer.iter().take(n.max(0) as usize) {
            syscall::kputchar(byte);
        }

        if n <= 0 {
            syscall::sleep_us(2_000);
        }
    }
}

fn open_retrying(path: &str, mode: OpenMode) -> i64 {
    loop {
        let fd = syscall::open(path, mode);
        if fd >= 0 {
            return fd;
        }
        syscall::sleep_us(10_000);
    }
}
