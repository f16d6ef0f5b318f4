/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel entry.
//!
//! The loader calls `kmain(pa_memdisk_begin, pa_memdisk_end)` with
//! asynchronous exceptions masked, the MMU running an identity map of low
//! memory plus the `KA_BEGIN` high-half window, and SP inside that window.
//! The memdisk blob is the raw file-system image produced by `rigel-mkfs`.
//!
//! Initialization order is fixed: bss, heap, frame allocator, kernel
//! translation table, trap vector, drivers, file system, process subsystem
//! and logging, then the first task and the first context restore.

#![no_std]
#![no_main]

extern crate alloc;

use rigel_base::align::{align_down, align_up};
use rigel_base::defs::{platform, KA_BEGIN, PAGE_SIZE};
use rigel_fs::{DiskMeta, FileSystem, MemoryDisk};

use rigel_kernel::arch::{exception, time};
use rigel_kernel::console::register_console;
use rigel_kernel::memory::heap::{KERNEL_HEAP, KERNEL_HEAP_SIZE};
use rigel_kernel::memory::{AddressSpace, FrameAllocator, Regime};
use rigel_kernel::nsfs::Namespace;
use rigel_kernel::state::{Kernel, KERNEL};
use rigel_kernel::{drivers, info};

extern "C" {
    static mut __bss_begin: u64;
    static mut __bss_end: u64;
    static __kernel_end: u8;
}

#[no_mangle]
#[link_section = ".text.entry"]
pub unsafe extern "C" fn kmain(pa_memdisk_begin: u64, pa_memdisk_end: u64) -> ! {
    r0::zero_bss(
        core::ptr::addr_of_mut!(__bss_begin),
        core::ptr::addr_of_mut!(__bss_end),
    );

    // The heap sits directly behind the image, inside the loader-provided
    // high-half window.
    let heap_begin = align_up(core::ptr::addr_of!(__kernel_end) as u64, PAGE_SIZE);
    KERNEL_HEAP.init(heap_begin, KERNEL_HEAP_SIZE);

    // Physical memory. Everything from the bottom of RAM (loader, image,
    // heap) up to the end of the heap is spoken for, as is the memdisk.
    let heap_end_pa = heap_begin + KERNEL_HEAP_SIZE - KA_BEGIN;
    let mut frames = FrameAllocator::new(platform::RAM_BASE, platform::RAM_SIZE);
    assert!(frames.alloc_at(
        platform::RAM_BASE,
        (heap_end_pa - platform::RAM_BASE) / PAGE_SIZE
    ));

    let memdisk_first = align_down(pa_memdisk_begin, PAGE_SIZE);
    let memdisk_last = align_up(pa_memdisk_end, PAGE_SIZE);
    // The loader may have parked the blob inside the already-reserved low
    // region; only claim it when it lies outside.
    let _ = frames.alloc_at(memdisk_first, (memdisk_last - memdisk_first) / PAGE_SIZE);

    // The kernel's own translation: image + heap, the two device windows
    // and the memdisk, all at KA_BEGIN + physical.
    let mut kernel_space = AddressSpace::new(Regime::Kernel);
    map_phys_range(&mut kernel_space, platform::RAM_BASE, heap_end_pa);
    map_phys_range(
        &mut kernel_space,
        platform::UART_BASE,
        platform::UART_BASE + PAGE_SIZE,
    );
    map_phys_range(
        &mut kernel_space,
        platform::GICD_BASE,
        platform::GICD_BASE + PAGE_SIZE,
    );
    map_phys_range(
        &mut kernel_space,
        platform::GICC_BASE,
        platform::GICC_BASE + PAGE_SIZE,
    );
    map_phys_range(&mut kernel_space, memdisk_first, memdisk_last);
    kernel_space.activate();

    exception::init();
    drivers::init();
    register_console(&drivers::PL011);

    info!("{} booting", rigel_kernel::version());
    info!(
        "memdisk at {:#x}..{:#x} ({} KiB)",
        pa_memdisk_begin,
        pa_memdisk_end,
        (pa_memdisk_end - pa_memdisk_begin) / 1024
    );

    // Mount the memdisk.
    let blob = core::slice::from_raw_parts_mut(
        (KA_BEGIN + pa_memdisk_begin) as *mut u8,
        (pa_memdisk_end - pa_memdisk_begin) as usize,
    );
    let meta = DiskMeta::from_bytes(blob).expect("memdisk superblock is damaged");
    let disk = MemoryDisk::new(blob, meta.block_size as usize);
    let fs = FileSystem::open(disk).expect("memdisk will not mount");

    let mut ns = Namespace::new(fs);
    let klog = ns.setup_kernel_log().expect("cannot set up /kernel/log");

    let resume = KERNEL.with(|cell| {
        if cell.set(Kernel::new(frames, kernel_space, ns, klog)).is_err() {
            panic!("kernel state initialized twice");
        }
        let kernel = cell.get_mut().unwrap();

        let init = kernel.spawn("/app/init").expect("cannot start /app/init");
        info!("started /app/init as task {}", init);

        kernel.reschedule(time::now_us());
        kernel.resume()
    });

    exception::restore_context(resume)
}

/// Map `[begin, end)` physical into the high-half window.
fn map_phys_range(space: &mut AddressSpace, begin: u64, end: u64) {
    let mut pa = begin;
    while pa < end {
        space.map(KA_BEGIN + pa, pa);
        pa += PAGE_SIZE;
    }
}
