/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Tasks: the scheduling and protection unit.

mod lifecycle;

pub use lifecycle::TaskError;

use alloc::collections::{BTreeMap, BTreeSet};

use rigel_base::defs::{KA_BEGIN, KERNEL_STACK_SIZE};
use rigel_base::syscall::{OpenMode, TaskState, PRIORITY_DEFAULT};

use crate::memory::AddressSpace;
use crate::nsfs::NodeId;
use crate::sched::TaskAttrs;

/// Task ids are unique, monotonically assigned and never recycled. Id 0 is
/// the kernel pseudo-pid used for kernel-held namespace references.
pub type Pid = u64;

/// Saved CPU state, in the exact order the trap stubs push it onto the
/// kernel stack: 31 general registers, saved program status, program
/// counter, user stack pointer.
#[derive(Debug, Clone)]
#[repr(C)]
pub struct Context {
    pub regs: [u64; 31],
    pub spsr: u64,
    pub pc: u64,
    pub usp: u64,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Context>(), 34 * 8);

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; 31],
            spsr: 0,
            pc: 0,
            usp: 0,
        }
    }
}

/// One task's reference into a shared node.
#[derive(Debug, Clone)]
pub struct Handle {
    pub node: NodeId,
    pub mode: OpenMode,
    pub offset: u64,
}

pub struct Task {
    pub pid: Pid,
    /// Scheduling weight in `[10, 1000]`; larger runs more.
    pub priority: u16,
    /// Physical time divided by priority; the scheduler's ordering key.
    pub vruntime: u64,
    pub context: Context,
    /// When set, the context restore loads `return_value` into x0.
    pub has_return_value: bool,
    pub return_value: u64,
    /// Base of the owned, physically contiguous kernel stack.
    pub kernel_stack_pa: u64,
    pub space: AddressSpace,
    pub handles: BTreeMap<u64, Handle>,
    next_handle: u64,
}

impl Task {
    pub fn new(pid: Pid, kernel_stack_pa: u64, space: AddressSpace) -> Self {
        Self {
            pid,
            priority: PRIORITY_DEFAULT,
            vruntime: 0,
            context: Context::zeroed(),
            has_return_value: false,
            return_value: 0,
            kernel_stack_pa,
            space,
            handles: BTreeMap::new(),
            next_handle: 0,
        }
    }

    /// Kernel virtual address of the stack top, as loaded into SP at the
    /// context restore.
    pub fn ksp_top(&self) -> u64 {
        KA_BEGIN + self.kernel_stack_pa + KERNEL_STACK_SIZE
    }

    pub fn set_return_value(&mut self, value: u64) {
        self.has_return_value = true;
        self.return_value = value;
    }

    /// Park a handle under a fresh per-task id.
    pub fn insert_handle(&mut self, handle: Handle) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(id, handle);
        id
    }

    /// Install a handle under a fixed id; fork mirrors the parent's table
    /// this way so the child's ids line up.
    pub fn adopt_handle(&mut self, id: u64, handle: Handle) {
        self.handles.insert(id, handle);
        self.next_handle = self.next_handle.max(id + 1);
    }

    /// Empty the handle table, yielding the handles; exec and exit close
    /// them against the namespace. Fresh handle ids start over at 0.
    pub fn drain_handles(&mut self) -> impl Iterator<Item = Handle> {
        self.next_handle = 0;
        core::mem::take(&mut self.handles).into_values()
    }
}

/// All live tasks plus the set of exited pids `tstat` still answers for.
pub struct TaskTable {
    tasks: BTreeMap<Pid, Task>,
    terminated: BTreeSet<Pid>,
    next_pid: Pid,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            terminated: BTreeSet::new(),
            next_pid: 1,
        }
    }

    pub fn allocate_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.pid, task);
    }

    pub fn get(&self, pid: Pid) -> Option<&Task> {
        self.tasks.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        self.tasks.get_mut(&pid)
    }

    /// Detach a task, leaving a zombie marker behind for `tstat`.
    pub fn remove(&mut self, pid: Pid) -> Option<Task> {
        let task = self.tasks.remove(&pid)?;
        self.terminated.insert(pid);
        Some(task)
    }

    pub fn state(&self, pid: Pid) -> TaskState {
        if self.tasks.contains_key(&pid) {
            TaskState::Running
        } else if self.terminated.contains(&pid) {
            TaskState::Terminated
        } else {
            TaskState::Invalid
        }
    }
}

impl TaskAttrs for TaskTable {
    fn vruntime(&self, pid: Pid) -> u64 {
        self.tasks[&pid].vruntime
    }

    fn set_vruntime(&mut self, pid: Pid, vruntime: u64) {
        self.tasks.get_mut(&pid).unwrap().vruntime = vruntime;
    }

    fn priority(&self, pid: Pid) -> u16 {
        self.tasks[&pid].priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Regime;

    fn task(pid: Pid) -> Task {
        Task::new(pid, 0x4100_0000, AddressSpace::new(Regime::User))
    }

    #[test]
    fn tstat_states() {
        let mut tasks = TaskTable::new();
        let pid = tasks.allocate_pid();
        assert_eq!(pid, 1);
        tasks.insert(task(pid));

        assert_eq!(tasks.state(pid), TaskState::Running);
        assert_eq!(tasks.state(99), TaskState::Invalid);

        tasks.remove(pid);
        assert_eq!(tasks.state(pid), TaskState::Terminated);
    }

    #[test]
    fn pids_are_never_recycled() {
        let mut tasks = TaskTable::new();
        let first = tasks.allocate_pid();
        tasks.insert(task(first));
        tasks.remove(first);
        assert_ne!(tasks.allocate_pid(), first);
    }

    #[test]
    fn handle_ids_are_per_task() {
        let mut a = task(1);
        let handle = Handle {
            node: 0,
            mode: OpenMode::Read,
            offset: 0,
        };
        assert_eq!(a.insert_handle(handle.clone()), 0);
        assert_eq!(a.insert_handle(handle.clone()), 1);

        let mut b = task(2);
        assert_eq!(b.insert_handle(handle), 0);
    }
}
