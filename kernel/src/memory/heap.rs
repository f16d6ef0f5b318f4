/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The kernel heap: the shared free-list core wired up as the global
//! allocator over a fixed region behind the kernel image.

use core::alloc::{GlobalAlloc, Layout};

use rigel_base::heap::FreeList;

use crate::sync::TrapCell;

/// Bytes reserved for the kernel heap, directly after the image.
pub const KERNEL_HEAP_SIZE: u64 = 256 << 20;

/// The global allocator. Usable once [`KernelHeap::init`] ran; allocations
/// before that fail, which the boot path treats as fatal.
pub struct KernelHeap {
    inner: TrapCell<Option<FreeList>>,
}

impl KernelHeap {
    pub const fn uninit() -> Self {
        Self {
            inner: TrapCell::new(None),
        }
    }

    /// Hand the heap its memory. Called exactly once, before anything
    /// allocates.
    ///
    /// # Safety
    ///
    /// `[begin, begin + size)` must be mapped, writable and unused.
    pub unsafe fn init(&self, begin: u64, size: u64) {
        self.inner.with(|heap| {
            assert!(heap.is_none(), "kernel heap initialized twice");
            *heap = Some(unsafe { FreeList::new(begin as usize, size as usize) });
        });
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.inner.with(|heap| match heap {
            Some(list) => list
                .allocate(layout.size(), layout.align())
                .map(|p| p.as_ptr())
                .unwrap_or(core::ptr::null_mut()),
            None => core::ptr::null_mut(),
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.inner.with(|heap| unsafe {
            heap.as_mut()
                .expect("kernel heap used before init")
                .deallocate(ptr)
        });
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        #[global_allocator]
        pub static KERNEL_HEAP: KernelHeap = KernelHeap::uninit();
    } else {
        // Host unit-test builds use the host allocator.
        pub static KERNEL_HEAP: KernelHeap = KernelHeap::uninit();
    }
}
