/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel synchronization.
//!
//! Rigel runs on one CPU and keeps asynchronous exceptions masked from trap
//! entry to the context restore, so kernel data is never *contended* and no
//! real lock exists anywhere in the kernel. What can still go wrong is
//! reentrance: a handler reaching back into state it is already in the
//! middle of mutating, for example by faulting inside a fault path. Every
//! piece of global kernel state therefore lives in a [`TrapCell`], which
//! hands its value to one closure at a time and turns reentrance into an
//! immediate panic instead of aliased `&mut` access.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// Single-CPU cell for trap-driven state; see the module docs.
pub struct TrapCell<T: ?Sized> {
    /// Set for the duration of a [`TrapCell::with`] call.
    engaged: AtomicBool,
    value: UnsafeCell<T>,
}

// One core, exceptions masked while engaged: handing out one `&mut` at a
// time is exactly what the engaged flag enforces.
unsafe impl<T> Send for TrapCell<T> where T: ?Sized + Send {}
unsafe impl<T> Sync for TrapCell<T> where T: ?Sized + Send {}

impl<T> TrapCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            engaged: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// Panics when called again while an earlier `with` on the same cell is
    /// still on the call stack; that is a kernel bug, never a wait
    /// condition.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let reentered = self.engaged.swap(true, Ordering::Acquire);
        assert!(!reentered, "reentrant access to kernel state");

        let out = f(unsafe { &mut *self.value.get() });

        self.engaged.store(false, Ordering::Release);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trips() {
        let cell = TrapCell::new(7u64);
        cell.with(|v| *v += 1);
        assert_eq!(cell.with(|v| *v), 8);
    }

    #[test]
    fn distinct_cells_may_nest() {
        let outer = TrapCell::new(1u64);
        let inner = TrapCell::new(2u64);
        let sum = outer.with(|a| inner.with(|b| *a + *b));
        assert_eq!(sum, 3);
    }

    #[test]
    #[should_panic(expected = "reentrant access")]
    fn reentrance_is_caught() {
        let cell = TrapCell::new(0u64);
        cell.with(|_| {
            cell.with(|v| *v);
        });
    }
}
