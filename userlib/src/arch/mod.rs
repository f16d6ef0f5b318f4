/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Architecture-specific user-space glue.

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::*;
