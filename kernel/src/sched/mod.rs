/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Weighted-fair scheduling, semaphores and timed wakeups.

mod avl;
mod clock;
mod scheduler;
mod semaphore;

pub use avl::AvlTree;
pub use clock::TimerQueue;
pub use scheduler::{Scheduler, TaskAttrs};
pub use semaphore::{SemError, SemaphoreTable, SignalOutcome, WaitOutcome};
