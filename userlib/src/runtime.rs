/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Program bootstrap: heap, stdio handles, `main`, exit.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;

use rigel_base::defs::{PAGE_SIZE, USERSPACE_HEAP};
use rigel_base::heap::FreeList;
use rigel_base::syscall::OpenMode;

use crate::syscall;

extern "C" {
    fn main() -> i64;
}

/// The runtime entry. The kernel starts every image here with a fresh
/// stack and an empty handle table.
#[no_mangle]
#[link_section = ".text.entry"]
pub extern "C" fn _start() -> ! {
    init_heap();
    init_stdio();

    unsafe { main() };
    syscall::exit()
}

//--------------------------------------------------------------------------------------------------
// Paged heap
//--------------------------------------------------------------------------------------------------

/// A free-list allocator over the user heap window, growing page by page
/// through the ALLOC system call.
struct PagedHeap {
    inner: UnsafeCell<Option<HeapState>>,
}

struct HeapState {
    list: FreeList,
    /// Bytes of the window mapped so far.
    mapped: u64,
}

// User programs are single-threaded.
unsafe impl Sync for PagedHeap {}

#[global_allocator]
static HEAP: PagedHeap = PagedHeap {
    inner: UnsafeCell::new(None),
};

fn init_heap() {
    assert!(
        syscall::allocate_page(USERSPACE_HEAP),
        "cannot map the first heap page"
    );
    let state = HeapState {
        list: unsafe { FreeList::new(USERSPACE_HEAP as usize, PAGE_SIZE as usize) },
        mapped: PAGE_SIZE,
    };
    unsafe { *HEAP.inner.get() = Some(state) };
}

unsafe impl GlobalAlloc for PagedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let state = match &mut *self.inner.get() {
            Some(state) => state,
            None => return core::ptr::null_mut(),
        };

        if let Some(p) = state.list.allocate(layout.size(), layout.align()) {
            return p.as_ptr();
        }

        // Grow the window far enough for the request plus bookkeeping and
        // retry once.
        let wanted = (layout.size() + layout.align() + 32) as u64;
        let pages = (wanted + PAGE_SIZE - 1) / PAGE_SIZE;
        for _ in 0..pages {
            if !syscall::allocate_page(USERSPACE_HEAP + state.mapped) {
                return core::ptr::null_mut();
            }
            state.mapped += PAGE_SIZE;
        }
        state
            .list
            .extend((USERSPACE_HEAP + state.mapped) as usize);

        state
            .list
            .allocate(layout.size(), layout.align())
            .map(|p| p.as_ptr())
            .unwrap_or(core::ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(state) = &mut *self.inner.get() {
            state.list.deallocate(ptr);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Stdio wiring
//--------------------------------------------------------------------------------------------------

/// Default input; handle 0 by construction.
pub static mut FD_STDIN: i64 = -1;
/// Default output; handle 1 by construction.
pub static mut FD_STDOUT: i64 = -1;

fn init_stdio() {
    use alloc::format;

    let pid = syscall::get_pid();
    let stdin = syscall::open(&format!("/proc/{}/fifo/stdin", pid), OpenMode::Read);
    let stdout = syscall::open(&format!("/proc/{}/fifo/stdout", pid), OpenMode::Write);
    assert!(stdin == 0 && stdout == 1, "stdio fifos did not open as 0/1");

    unsafe {
        FD_STDIN = stdin;
        FD_STDOUT = stdout;
    }
}

//--------------------------------------------------------------------------------------------------
// Panic
//--------------------------------------------------------------------------------------------------

#[panic_handler]
fn panicked(info: &core::panic::PanicInfo) -> ! {
    crate::kprintln!("task {} panicked: {}", syscall::get_pid(), info);
    syscall::exit()
}
