/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Scheduling-weight demo: pick a priority, then burn CPU visibly.

#![no_std]
#![no_main]

use rigel_user::io::getline;
use rigel_user::{println, syscall};

#[no_mangle]
extern "C" fn main() -> i64 {
    println!("Please enter a priority (10-1000):");
    let line = getline();

    let priority: u16 = match line.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            println!("Failed to parse number");
            return 1;
        }
    };
    if !(10..=1000).contains(&priority) {
        println!("Invalid priority, should be between 10 and 1000");
        return 1;
    }

    syscall::set_priority(priority);
    for i in 0..500 {
        println!("this is demo for priority - {}", i);
    }
    println!("demo done");
    0
}
