/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Greeting demo.

#![no_std]
#![no_main]

use rigel_user::io::getline;
use rigel_user::println;

#[no_mangle]
extern "C" fn main() -> i64 {
    println!("What's your name?");
    let name = getline();
    println!("Hello, {}!", name.trim());
    0
}
