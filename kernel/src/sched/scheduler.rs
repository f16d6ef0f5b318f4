/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The weighted-fair scheduler.
//!
//! Every runnable task except the executing one sits in an AVL tree keyed
//! by `(vruntime, pid)`; the task with the smallest virtual runtime runs
//! next. Physical time is accounted on every scheduling decision as
//! `vruntime += max(delta / priority, 1)`, so a larger priority accrues
//! virtual time more slowly and receives a proportionally larger CPU share.

use super::avl::AvlTree;
use crate::task::Pid;

/// The scheduling attributes the scheduler reads and writes on tasks. The
/// task table implements this; tests substitute a plain map.
pub trait TaskAttrs {
    fn vruntime(&self, pid: Pid) -> u64;
    fn set_vruntime(&mut self, pid: Pid, vruntime: u64);
    fn priority(&self, pid: Pid) -> u16;
}

pub struct Scheduler {
    ready: AvlTree<(u64, Pid)>,
    executing: Option<Pid>,
    slice_start_us: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            ready: AvlTree::new(),
            executing: None,
            slice_start_us: 0,
        }
    }

    pub fn executing(&self) -> Option<Pid> {
        self.executing
    }

    pub fn has_runnable(&self) -> bool {
        self.executing.is_some() || !self.ready.is_empty()
    }

    /// Admit a task. The arrival is boosted just below the smallest
    /// vruntime in sight so it runs next without erasing anyone's credit.
    pub fn add(&mut self, tasks: &mut impl TaskAttrs, pid: Pid) {
        let vruntime = if let Some(&(smallest, _)) = self.ready.smallest() {
            smallest.max(1) - 1
        } else if let Some(executing) = self.executing {
            tasks.vruntime(executing).max(1) - 1
        } else {
            0
        };

        tasks.set_vruntime(pid, vruntime);
        self.ready.insert((vruntime, pid));
    }

    /// Take a task out of circulation. The caller reschedules afterwards if
    /// the executing slot was vacated.
    pub fn remove(&mut self, tasks: &impl TaskAttrs, pid: Pid) {
        assert!(pid != 0, "removing task id 0 is forbidden");

        if self.executing == Some(pid) {
            self.executing = None;
            return;
        }

        let present = self.ready.remove(&(tasks.vruntime(pid), pid));
        assert!(present, "task {} is not schedulable", pid);
    }

    /// Swap `old` for `new` in place: same vruntime, same slot. `exec`
    /// relies on this to keep the caller's fairness credit.
    pub fn replace(&mut self, tasks: &mut impl TaskAttrs, old: Pid, new: Pid) {
        let vruntime = tasks.vruntime(old);
        tasks.set_vruntime(new, vruntime);

        if self.executing == Some(old) {
            self.executing = Some(new);
            return;
        }

        let present = self.ready.remove(&(vruntime, old));
        assert!(present, "task {} is not schedulable", old);
        self.ready.insert((vruntime, new));
    }

    /// Account the executing task and pick the next one. Panics when there
    /// is nothing left to run.
    pub fn schedule(&mut self, tasks: &mut impl TaskAttrs, now_us: u64) -> Pid {
        if let Some(executing) = self.executing.take() {
            let delta = now_us - self.slice_start_us;
            let accrued = (delta / tasks.priority(executing) as u64).max(1);
            let vruntime = tasks.vruntime(executing) + accrued;
            tasks.set_vruntime(executing, vruntime);
            self.ready.insert((vruntime, executing));
        }

        let (_, next) = self
            .ready
            .pop_smallest()
            .expect("schedule() with no runnable tasks");
        self.executing = Some(next);
        self.slice_start_us = now_us;
        next
    }

    /// Ready-set vruntimes in tree order, for diagnostics and tests.
    pub fn ready_order(&self) -> impl Iterator<Item = &(u64, Pid)> {
        self.ready.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::vec::Vec;

    #[derive(Default)]
    struct Attrs {
        tasks: BTreeMap<Pid, (u64, u16)>,
    }

    impl Attrs {
        fn with(pids: &[(Pid, u16)]) -> Self {
            let mut attrs = Attrs::default();
            for &(pid, priority) in pids {
                attrs.tasks.insert(pid, (0, priority));
            }
            attrs
        }
    }

    impl TaskAttrs for Attrs {
        fn vruntime(&self, pid: Pid) -> u64 {
            self.tasks[&pid].0
        }

        fn set_vruntime(&mut self, pid: Pid, vruntime: u64) {
            self.tasks.get_mut(&pid).unwrap().0 = vruntime;
        }

        fn priority(&self, pid: Pid) -> u16 {
            self.tasks[&pid].1
        }
    }

    const TICK: u64 = 10_000;

    #[test]
    fn new_arrival_runs_next() {
        let mut attrs = Attrs::with(&[(1, 1000), (2, 1000), (3, 1000)]);
        let mut sched = Scheduler::new();

        sched.add(&mut attrs, 1);
        sched.add(&mut attrs, 2);

        let mut now = 0;
        for _ in 0..10 {
            sched.schedule(&mut attrs, now);
            now += TICK;
        }

        sched.add(&mut attrs, 3);
        assert_eq!(sched.schedule(&mut attrs, now), 3);
    }

    #[test]
    fn ready_set_is_ordered_by_vruntime() {
        let mut attrs = Attrs::with(&[(1, 1000), (2, 500), (3, 100), (4, 10)]);
        let mut sched = Scheduler::new();
        for pid in 1..=4 {
            sched.add(&mut attrs, pid);
        }

        let mut now = 0;
        for _ in 0..200 {
            sched.schedule(&mut attrs, now);
            now += TICK;

            let order: Vec<u64> = sched.ready_order().map(|&(v, _)| v).collect();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(order, sorted);

            if let Some(&(smallest, _)) = sched.ready_order().next() {
                assert!(order.iter().all(|&v| smallest <= v));
            }
        }
    }

    #[test]
    fn cpu_share_follows_priority_ratio() {
        let mut attrs = Attrs::with(&[(1, 1000), (2, 100)]);
        let mut sched = Scheduler::new();
        sched.add(&mut attrs, 1);
        sched.add(&mut attrs, 2);

        let mut now = 0;
        let mut cpu = BTreeMap::from([(1u64, 0u64), (2, 0)]);

        // One simulated second of 10 ms slices.
        for _ in 0..100 {
            let pid = sched.schedule(&mut attrs, now);
            *cpu.get_mut(&pid).unwrap() += TICK;
            now += TICK;
        }

        let fast = cpu[&1] as f64;
        let slow = cpu[&2] as f64;
        let ratio = fast / slow;
        assert!(
            (ratio - 10.0).abs() / 10.0 <= 0.10,
            "share ratio {} too far from 10:1",
            ratio
        );
    }

    #[test]
    fn removing_the_executing_task_vacates_the_slot() {
        let mut attrs = Attrs::with(&[(1, 1000), (2, 1000)]);
        let mut sched = Scheduler::new();
        sched.add(&mut attrs, 1);
        sched.add(&mut attrs, 2);

        let first = sched.schedule(&mut attrs, 0);
        sched.remove(&attrs, first);
        assert_eq!(sched.executing(), None);

        let second = sched.schedule(&mut attrs, TICK);
        assert_ne!(second, first);
    }

    #[test]
    fn replace_keeps_the_slot_and_credit() {
        let mut attrs = Attrs::with(&[(1, 1000), (2, 1000), (7, 1000)]);
        let mut sched = Scheduler::new();
        sched.add(&mut attrs, 1);
        sched.add(&mut attrs, 2);

        let running = sched.schedule(&mut attrs, 0);
        let before = attrs.vruntime(running);
        sched.replace(&mut attrs, running, 7);

        assert_eq!(sched.executing(), Some(7));
        assert_eq!(attrs.vruntime(7), before);
    }

    #[test]
    #[should_panic(expected = "no runnable tasks")]
    fn scheduling_nothing_panics() {
        let mut attrs = Attrs::default();
        let mut sched = Scheduler::new();
        sched.schedule(&mut attrs, 0);
    }

    #[test]
    #[should_panic(expected = "forbidden")]
    fn removing_task_zero_is_forbidden() {
        let mut attrs = Attrs::with(&[(1, 1000)]);
        let mut sched = Scheduler::new();
        sched.remove(&attrs, 0);
    }
}
