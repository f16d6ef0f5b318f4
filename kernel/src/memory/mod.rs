/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Physical frames, translation tables, kernel heap.

mod frames;
pub mod heap;
mod translation;

pub use frames::FrameAllocator;
pub use translation::{AddressSpace, Regime};
