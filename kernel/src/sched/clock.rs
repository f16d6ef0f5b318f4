/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Timed wakeups: an expiration tree over monotonic microseconds.
//!
//! `sem_signal_after` records `(semaphore, deadline)` here; every
//! reschedule drains whatever has expired and turns each entry into one
//! semaphore signal.

use alloc::vec::Vec;

use super::avl::AvlTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    expires_us: u64,
    /// Distinguishes entries with equal deadlines.
    seq: u64,
    sem: u64,
}

pub struct TimerQueue {
    entries: AvlTree<TimerEntry>,
    seq: u64,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self {
            entries: AvlTree::new(),
            seq: 0,
        }
    }

    /// Schedule a signal for `sem` at `expires_us`.
    pub fn arm(&mut self, sem: u64, expires_us: u64) {
        let seq = self.seq;
        self.seq += 1;
        self.entries.insert(TimerEntry {
            expires_us,
            seq,
            sem,
        });
    }

    /// Pop every entry with a deadline at or before `now_us`, in deadline
    /// order.
    pub fn drain_expired(&mut self, now_us: u64) -> Vec<u64> {
        let mut expired = Vec::new();
        while let Some(entry) = self.entries.smallest() {
            if entry.expires_us > now_us {
                break;
            }
            let entry = self.entries.pop_smallest().unwrap();
            expired.push(entry.sem);
        }
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.arm(3, 300);
        timers.arm(1, 100);
        timers.arm(2, 200);

        assert_eq!(timers.drain_expired(50), Vec::<u64>::new());
        assert_eq!(timers.drain_expired(250), [1, 2]);
        assert_eq!(timers.drain_expired(1000), [3]);
        assert!(timers.is_empty());
    }

    #[test]
    fn equal_deadlines_all_fire() {
        let mut timers = TimerQueue::new();
        timers.arm(5, 100);
        timers.arm(6, 100);
        timers.arm(5, 100);

        let fired = timers.drain_expired(100);
        assert_eq!(fired.len(), 3);
        assert_eq!(fired.iter().filter(|&&s| s == 5).count(), 2);
    }
}
