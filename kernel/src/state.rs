/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The kernel state: one value owning every subsystem, living in the
//! global trap cell. Initialization order is fixed by `kmain`: heap,
//! frame allocator, kernel translation table, drivers, file system, process
//! subsystem, timer, logging.
//!
//! Trap handlers run to completion against `&mut Kernel` and end by asking
//! for a [`Resume`]; the architecture layer then performs the actual
//! context restore. Control never re-enters the kernel except through the
//! vector, so no handler ever observes a half-finished update.

use alloc::vec::Vec;
use once_cell::unsync::OnceCell;

use rigel_base::align::align_down;
use rigel_base::defs::{
    KA_BEGIN, KERNEL_STACK_SIZE, PAGE_SIZE, USERSPACE_STACK_BOTTOM, USERSPACE_STACK_TOP,
};
use rigel_fs::MemoryDisk;

use crate::console::{console, interface::ConsoleOps};
use crate::memory::{AddressSpace, FrameAllocator};
use crate::nsfs::{Namespace, NodeId};
use crate::sched::{Scheduler, SemaphoreTable, SignalOutcome, TimerQueue};
use crate::sync::TrapCell;
use crate::task::{Context, Pid, Task, TaskTable};

/// Timer slice: every exit to user re-arms the preemption timer this far
/// into the future.
pub const SCHEDULING_SLICE_US: u64 = 10_000;

/// Everything the context restore needs, copied out of the kernel state so
/// the restore can run without holding it.
pub struct Resume {
    pub regs: [u64; 31],
    pub spsr: u64,
    pub pc: u64,
    pub usp: u64,
    pub ksp: u64,
    pub ttbr0_pa: u64,
}

pub struct Kernel {
    pub frames: FrameAllocator,
    pub kernel_space: AddressSpace,
    pub ns: Namespace<MemoryDisk<'static>>,
    pub tasks: TaskTable,
    pub sched: Scheduler,
    pub sems: SemaphoreTable,
    pub timers: TimerQueue,
    /// The `/kernel/log` fifo, held open for writing by pseudo-pid 0.
    pub klog: NodeId,
    /// Kernel stacks of exited tasks. A task's final trap still runs on its
    /// own stack, so the frames are only returned on the next trap entry,
    /// after the context switch has moved off them.
    stale_stacks: Vec<u64>,
}

/// The kernel state singleton.
pub static KERNEL: TrapCell<OnceCell<Kernel>> = TrapCell::new(OnceCell::new());

impl Kernel {
    pub fn new(
        frames: FrameAllocator,
        kernel_space: AddressSpace,
        ns: Namespace<MemoryDisk<'static>>,
        klog: NodeId,
    ) -> Self {
        Self {
            frames,
            kernel_space,
            ns,
            tasks: TaskTable::new(),
            sched: Scheduler::new(),
            sems: SemaphoreTable::new(),
            timers: TimerQueue::new(),
            klog,
            stale_stacks: Vec::new(),
        }
    }

    pub fn current(&self) -> &Task {
        let pid = self.sched.executing().expect("no executing task");
        self.tasks.get(pid).expect("executing task not in table")
    }

    pub fn current_mut(&mut self) -> &mut Task {
        let pid = self.sched.executing().expect("no executing task");
        self.tasks.get_mut(pid).expect("executing task not in table")
    }

    /// First thing on every trap: move the saved frame into the current
    /// task's PCB and return stale kernel stacks, now that execution has
    /// left them for good.
    pub fn commit_frame(&mut self, frame: &Context) {
        for base in core::mem::take(&mut self.stale_stacks) {
            for i in 0..KERNEL_STACK_SIZE / PAGE_SIZE {
                self.frames.free(base + i * PAGE_SIZE);
            }
        }

        let task = self.current_mut();
        task.context = frame.clone();
        task.has_return_value = false;
        task.return_value = 0;
    }

    /// Defer returning a kernel stack until the next trap entry.
    pub fn retire_kernel_stack(&mut self, base_pa: u64) {
        self.stale_stacks.push(base_pa);
    }

    /// Make a blocked task runnable again; it resumes with return value 0.
    pub fn wake(&mut self, pid: Pid) {
        self.tasks
            .get_mut(pid)
            .expect("waking unknown task")
            .set_return_value(0);
        self.sched.add(&mut self.tasks, pid);
    }

    /// Drain expired timed wakeups, account the executing task and pick the
    /// next one.
    pub fn reschedule(&mut self, now_us: u64) {
        for sem in self.timers.drain_expired(now_us) {
            // The semaphore may be gone by expiry; stale entries just drop.
            if let Ok(SignalOutcome::Woken(pid)) = self.sems.signal(sem) {
                self.wake(pid);
            }
        }

        self.sched.schedule(&mut self.tasks, now_us);
    }

    /// Timer interrupt: preempt.
    pub fn on_timer(&mut self, now_us: u64) {
        self.reschedule(now_us);
    }

    /// Data abort from user space. A fault inside the stack window grows
    /// the stack by exactly one fresh frame; anything else is fatal.
    pub fn on_data_abort(&mut self, fault_addr: u64) {
        let page = align_down(fault_addr, PAGE_SIZE);
        if !(USERSPACE_STACK_BOTTOM..USERSPACE_STACK_TOP).contains(&page) {
            panic!("unhandled data abort at {:#x}", fault_addr);
        }

        let pa = self
            .frames
            .alloc(1)
            .expect("out of frames growing a user stack");
        self.map_into_kernel(pa);
        self.kernel_space.activate();
        zero_frame(pa);

        self.current_mut().space.map(page, pa);
    }

    /// Everything the exception exit path needs to return to the current
    /// task.
    pub fn resume(&mut self) -> Resume {
        let task = self.current_mut();
        if task.has_return_value {
            task.context.regs[0] = task.return_value;
        }
        Resume {
            regs: task.context.regs,
            spsr: task.context.spsr,
            pc: task.context.pc,
            usp: task.context.usp,
            ksp: task.ksp_top(),
            ttbr0_pa: task.space.base_pa(),
        }
    }

    /// Keep a frame reachable through the high-half window.
    pub fn map_into_kernel(&mut self, pa: u64) {
        self.kernel_space.map(KA_BEGIN + pa, pa);
    }

    /// PUTCHAR: append to the `/kernel/log` fifo and echo to the serial
    /// console. Bytes beyond the ring capacity fall off; the log is a
    /// best-effort sink.
    pub fn log_byte(&mut self, byte: u8) {
        let _ = self.ns.write(self.klog, 0, &[byte]);
        console().write_char(byte as char);
    }
}

/// Zero one frame through the high-half window. The frame must be mapped
/// into the active kernel space.
pub fn zero_frame(pa: u64) {
    unsafe {
        core::ptr::write_bytes((KA_BEGIN + pa) as *mut u8, 0, PAGE_SIZE as usize);
    }
}

/// Copy a whole frame through the high-half window.
pub fn copy_frame(dst_pa: u64, src_pa: u64) {
    unsafe {
        core::ptr::copy_nonoverlapping(
            (KA_BEGIN + src_pa) as *const u8,
            (KA_BEGIN + dst_pa) as *mut u8,
            PAGE_SIZE as usize,
        );
    }
}
