/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Counting semaphores with FIFO waiter lists.
//!
//! The kernel owns one registry of semaphores; tasks refer to them by id.
//! Waiters are task ids, resumed strictly in arrival order. The all-ones
//! count is reserved as the "destroyed" marker and can never be reached by
//! signalling.

use alloc::collections::{BTreeMap, VecDeque};
use snafu::Snafu;

use crate::task::Pid;

/// Reserved count marker; see module docs.
const DESTROYED: u64 = u64::MAX;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum SemError {
    /// No semaphore with that id.
    #[snafu(display("unknown semaphore"))]
    Unknown,

    /// Destroy refused: tasks are still blocked on it.
    #[snafu(display("semaphore has waiters"))]
    Busy,

    /// The count cannot grow into the reserved marker.
    #[snafu(display("semaphore count saturated"))]
    Saturated,
}

/// What a wait did.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The count was positive; it was decremented.
    Acquired,
    /// The caller is now queued and must leave the scheduler.
    Blocked,
}

/// What a signal did.
#[derive(Debug, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The front waiter must be made runnable again.
    Woken(Pid),
    /// Nobody was waiting; the count grew.
    Incremented,
}

struct Semaphore {
    count: u64,
    waiters: VecDeque<Pid>,
}

/// The semaphore registry. Ids are monotonically assigned and not recycled.
pub struct SemaphoreTable {
    sems: BTreeMap<u64, Semaphore>,
    next_id: u64,
}

impl Default for SemaphoreTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SemaphoreTable {
    pub const fn new() -> Self {
        Self {
            sems: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn create(&mut self, initial: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.sems.insert(
            id,
            Semaphore {
                count: initial.min(DESTROYED - 1),
                waiters: VecDeque::new(),
            },
        );
        id
    }

    pub fn wait(&mut self, id: u64, pid: Pid) -> Result<WaitOutcome, SemError> {
        let sem = self.sems.get_mut(&id).ok_or(SemError::Unknown)?;
        if sem.count > 0 {
            sem.count -= 1;
            Ok(WaitOutcome::Acquired)
        } else {
            sem.waiters.push_back(pid);
            Ok(WaitOutcome::Blocked)
        }
    }

    pub fn signal(&mut self, id: u64) -> Result<SignalOutcome, SemError> {
        let sem = self.sems.get_mut(&id).ok_or(SemError::Unknown)?;
        if let Some(front) = sem.waiters.pop_front() {
            return Ok(SignalOutcome::Woken(front));
        }
        if sem.count == DESTROYED - 1 {
            return Err(SemError::Saturated);
        }
        sem.count += 1;
        Ok(SignalOutcome::Incremented)
    }

    /// Remove a semaphore; refused while any task is blocked on it.
    pub fn destroy(&mut self, id: u64) -> Result<(), SemError> {
        let sem = self.sems.get_mut(&id).ok_or(SemError::Unknown)?;
        if !sem.waiters.is_empty() {
            return Err(SemError::Busy);
        }
        sem.count = DESTROYED;
        self.sems.remove(&id);
        Ok(())
    }

    pub fn exists(&self, id: u64) -> bool {
        self.sems.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_semantics_without_waiters() {
        let mut sems = SemaphoreTable::new();
        let id = sems.create(2);

        assert_eq!(sems.wait(id, 1), Ok(WaitOutcome::Acquired));
        assert_eq!(sems.wait(id, 1), Ok(WaitOutcome::Acquired));
        assert_eq!(sems.wait(id, 1), Ok(WaitOutcome::Blocked));

        // Signal with no waiters increments exactly then.
        let empty = sems.create(0);
        assert_eq!(sems.signal(empty), Ok(SignalOutcome::Incremented));
        assert_eq!(sems.wait(empty, 2), Ok(WaitOutcome::Acquired));
    }

    #[test]
    fn waiters_are_woken_in_arrival_order() {
        let mut sems = SemaphoreTable::new();
        let id = sems.create(0);

        assert_eq!(sems.wait(id, 11), Ok(WaitOutcome::Blocked));
        assert_eq!(sems.wait(id, 22), Ok(WaitOutcome::Blocked));
        assert_eq!(sems.wait(id, 33), Ok(WaitOutcome::Blocked));

        assert_eq!(sems.signal(id), Ok(SignalOutcome::Woken(11)));
        assert_eq!(sems.signal(id), Ok(SignalOutcome::Woken(22)));
        assert_eq!(sems.signal(id), Ok(SignalOutcome::Woken(33)));
        assert_eq!(sems.signal(id), Ok(SignalOutcome::Incremented));
    }

    #[test]
    fn destroy_refuses_while_tasks_wait() {
        let mut sems = SemaphoreTable::new();
        let id = sems.create(0);

        sems.wait(id, 7).unwrap();
        assert_eq!(sems.destroy(id), Err(SemError::Busy));

        assert_eq!(sems.signal(id), Ok(SignalOutcome::Woken(7)));
        assert_eq!(sems.destroy(id), Ok(()));
        assert_eq!(sems.destroy(id), Err(SemError::Unknown));
        assert!(!sems.exists(id));
    }

    #[test]
    fn ids_are_not_recycled() {
        let mut sems = SemaphoreTable::new();
        let a = sems.create(0);
        sems.destroy(a).unwrap();
        let b = sems.create(0);
        assert_ne!(a, b);
    }
}
