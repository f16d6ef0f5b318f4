/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Process lifecycle: create, fork, exec, exit, and explicit heap growth.
//!
//! Running out of frames, inodes or data blocks mid-build is an error
//! surfaced to the caller, never a kernel panic: image builds are staged so
//! that everything claimed for an aborted build goes straight back to the
//! allocator, and exec only tears the old image down once the replacement
//! is fully assembled.

use alloc::vec;
use alloc::vec::Vec;

use snafu::Snafu;

use rigel_base::defs::{
    KERNEL_STACK_SIZE, PAGE_SIZE, USERSPACE_HEAP, USERSPACE_HEAP_END, USERSPACE_STACK_TOP,
    USERSPACE_TEXT,
};
use rigel_base::syscall::OpenMode;

use crate::memory::{AddressSpace, Regime};
use crate::nsfs::NsError;
use crate::state::{copy_frame, zero_frame, Kernel};
use crate::task::{Handle, Pid, Task};

const KERNEL_STACK_FRAMES: u64 = KERNEL_STACK_SIZE / PAGE_SIZE;

/// Why a task could not be built or replaced.
#[derive(Debug, Snafu)]
pub enum TaskError {
    /// Physical memory ran out mid-build.
    #[snafu(display("out of physical frames"))]
    OutOfFrames,

    /// The namespace refused: missing image, exhausted inodes or data
    /// blocks, fifo subtree trouble.
    #[snafu(context(false), display("namespace: {}", source))]
    Namespace { source: NsError },
}

pub type Result<T, E = TaskError> = core::result::Result<T, E>;

impl Kernel {
    /// Create a new task running the program image at `path` and hand it to
    /// the scheduler.
    pub fn spawn(&mut self, path: &str) -> Result<Pid> {
        let image = self.read_image(path)?;

        let kernel_stack_pa = self.allocate_kernel_stack()?;
        let mut space = AddressSpace::new(Regime::User);
        if let Err(e) = self.load_program(&mut space, &image) {
            self.discard_build(space, kernel_stack_pa);
            return Err(e);
        }

        let pid = self.tasks.allocate_pid();
        if let Err(e) = self.ns.ensure_proc_fifos(pid) {
            self.discard_build(space, kernel_stack_pa);
            return Err(e.into());
        }

        let mut task = Task::new(pid, kernel_stack_pa, space);
        task.context.pc = USERSPACE_TEXT;
        task.context.usp = USERSPACE_STACK_TOP;

        self.tasks.insert(task);
        self.sched.add(&mut self.tasks, pid);
        Ok(pid)
    }

    /// Fork the executing task. The child gets a deep copy of the address
    /// space and of the handle table, a pending return value of 0, and its
    /// own `/proc` fifos; the parent gets the child pid, or a negative
    /// value (set by the dispatcher) when resources ran dry.
    pub fn fork_current(&mut self) -> Result<Pid> {
        let parent_pid = self.current().pid;
        let kernel_stack_pa = self.allocate_kernel_stack()?;

        // Deep-copy the user pages through the high-half window.
        let parent_pages = self.tasks.get(parent_pid).unwrap().space.enumerate();
        let mut space = AddressSpace::new(Regime::User);
        for (va, src_pa) in parent_pages {
            let dst_pa = match self.frames.alloc(1) {
                Some(pa) => pa,
                None => {
                    self.discard_build(space, kernel_stack_pa);
                    return Err(TaskError::OutOfFrames);
                }
            };
            self.map_into_kernel(dst_pa);
            self.kernel_space.activate();
            copy_frame(dst_pa, src_pa);
            space.map(va, dst_pa);
        }

        let child_pid = self.tasks.allocate_pid();
        if let Err(e) = self.ns.ensure_proc_fifos(child_pid) {
            self.discard_build(space, kernel_stack_pa);
            return Err(e.into());
        }

        let parent = self.tasks.get_mut(parent_pid).unwrap();
        let parent_context = parent.context.clone();
        let parent_priority = parent.priority;
        let handles: Vec<(u64, Handle)> = parent
            .handles
            .iter()
            .map(|(&id, handle)| (id, handle.clone()))
            .collect();

        let mut child = Task::new(child_pid, kernel_stack_pa, space);
        child.context = parent_context;
        child.priority = parent_priority;
        child.set_return_value(0);

        // Handles open in the parent are open in the child and refer to the
        // same shared nodes. The parent keeps each node alive for the whole
        // loop, so these registrations cannot miss.
        for (id, handle) in handles {
            self.ns.register(child_pid, handle.node, handle.mode)?;
            child.adopt_handle(id, handle);
        }

        self.tasks
            .get_mut(parent_pid)
            .unwrap()
            .set_return_value(child_pid);
        self.tasks.insert(child);
        self.sched.add(&mut self.tasks, child_pid);
        Ok(child_pid)
    }

    /// Replace the executing task's image. The pid and the scheduler slot
    /// survive; the old address space and handle table do not. Until the
    /// replacement image is fully assembled the caller's image stays
    /// untouched, so lookup failures and exhaustion report back instead.
    pub fn exec_current(&mut self, path: &str) -> Result<()> {
        let image = self.read_image(path)?;

        let mut space = AddressSpace::new(Regime::User);
        if let Err(e) = self.load_program(&mut space, &image) {
            self.release_user_frames(&space);
            return Err(e);
        }

        // Point of no return: tear down the old image.
        let pid = self.current().pid;
        let handles: Vec<Handle> = self.current_mut().drain_handles().collect();
        for handle in handles {
            self.ns.release(pid, handle.node);
        }

        let old_pages = self.current().space.enumerate();
        for (_, pa) in old_pages {
            self.frames.free(pa);
        }

        let task = self.current_mut();
        task.space = space;
        task.context = crate::task::Context::zeroed();
        task.context.pc = USERSPACE_TEXT;
        task.context.usp = USERSPACE_STACK_TOP;
        task.has_return_value = false;

        self.sched.replace(&mut self.tasks, pid, pid);
        Ok(())
    }

    /// Terminate the executing task and pick the next one. The zombie pid
    /// keeps answering TSTAT queries; the kernel stack is returned on the
    /// next trap entry.
    pub fn exit_current(&mut self, now_us: u64) {
        let pid = self.current().pid;

        let handles: Vec<Handle> = self.current_mut().drain_handles().collect();
        for handle in handles {
            self.ns.release(pid, handle.node);
        }

        let pages = self.current().space.enumerate();
        for (_, pa) in pages {
            self.frames.free(pa);
        }

        self.sched.remove(&self.tasks, pid);
        let task = self.tasks.remove(pid).expect("exiting task not in table");
        self.retire_kernel_stack(task.kernel_stack_pa);
        drop(task);

        self.reschedule(now_us);
    }

    /// ALLOC: map one page of user heap at `va`. Rejects unaligned
    /// addresses, addresses outside the heap window, pages that are already
    /// mapped, and frame exhaustion, all as a `false` result.
    pub fn allocate_user_page(&mut self, va: u64) -> bool {
        if va % PAGE_SIZE != 0 {
            return false;
        }
        if !(USERSPACE_HEAP..USERSPACE_HEAP_END).contains(&va) {
            return false;
        }
        if self.current().space.translate(va).is_some() {
            return false;
        }

        let pa = match self.frames.alloc(1) {
            Some(pa) => pa,
            None => return false,
        };
        self.map_into_kernel(pa);
        self.kernel_space.activate();
        zero_frame(pa);

        self.current_mut().space.map(va, pa);
        true
    }

    /// Read a whole program image out of the namespace.
    fn read_image(&mut self, path: &str) -> core::result::Result<Vec<u8>, NsError> {
        let node = self.ns.open(0, path, OpenMode::Read)?;
        let size = self.ns.size(node)?;
        if size == 0 {
            self.ns.close(0, node)?;
            return Err(NsError::NotFound);
        }

        let mut image = vec![0u8; size as usize];
        let n = self.ns.read(node, 0, &mut image)?;
        self.ns.close(0, node)?;
        if n != image.len() {
            return Err(NsError::NotFound);
        }
        Ok(image)
    }

    /// Map the image at `USERSPACE_TEXT` page by page and give the task its
    /// first stack page. On failure the pages mapped so far stay tracked in
    /// `space` for the caller to reclaim.
    fn load_program(&mut self, space: &mut AddressSpace, image: &[u8]) -> Result<()> {
        let mut at = 0;
        while at < image.len() {
            let pa = self.frames.alloc(1).ok_or(TaskError::OutOfFrames)?;
            self.map_into_kernel(pa);
            self.kernel_space.activate();
            zero_frame(pa);

            let chunk = (image.len() - at).min(PAGE_SIZE as usize);
            unsafe {
                core::ptr::copy_nonoverlapping(
                    image[at..].as_ptr(),
                    (rigel_base::defs::KA_BEGIN + pa) as *mut u8,
                    chunk,
                );
            }

            space.map(USERSPACE_TEXT + at as u64, pa);
            at += PAGE_SIZE as usize;
        }

        let stack_pa = self.frames.alloc(1).ok_or(TaskError::OutOfFrames)?;
        self.map_into_kernel(stack_pa);
        self.kernel_space.activate();
        zero_frame(stack_pa);
        space.map(USERSPACE_STACK_TOP - PAGE_SIZE, stack_pa);
        Ok(())
    }

    /// One contiguous kernel stack, mapped through the high-half window.
    fn allocate_kernel_stack(&mut self) -> Result<u64> {
        let base = self
            .frames
            .alloc(KERNEL_STACK_FRAMES)
            .ok_or(TaskError::OutOfFrames)?;
        for i in 0..KERNEL_STACK_FRAMES {
            self.map_into_kernel(base + i * PAGE_SIZE);
        }
        self.kernel_space.activate();
        Ok(base)
    }

    /// Undo an aborted task build: every frame the half-built address space
    /// holds, plus its kernel stack, returns to the allocator.
    fn discard_build(&mut self, space: AddressSpace, kernel_stack_pa: u64) {
        self.release_user_frames(&space);
        for i in 0..KERNEL_STACK_FRAMES {
            self.frames.free(kernel_stack_pa + i * PAGE_SIZE);
        }
    }

    /// Return every leaf frame of an address space that is not owned by a
    /// live task.
    fn release_user_frames(&mut self, space: &AddressSpace) {
        for (_, pa) in space.enumerate() {
            self.frames.free(pa);
        }
    }
}
