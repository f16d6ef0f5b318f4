/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Memory map and platform constants shared by the kernel, the loader and
//! the user runtime. The user-space values must agree with the linker script
//! under `apps/`.

/// Translation granule. Every frame and page in the system is this large.
pub const PAGE_SIZE: u64 = 4096;

/// Base of the kernel half-space. With 39-bit virtual addresses and
/// `T1SZ = 25`, `TTBR1_EL1` translation starts here; kernel virtual
/// addresses are `KA_BEGIN + physical`.
pub const KA_BEGIN: u64 = 0xFFFF_FF80_0000_0000;

/// Program images are mapped from this user virtual address, page by page.
pub const USERSPACE_TEXT: u64 = 0x20_0000;

/// User stacks grow on demand anywhere inside this window.
pub const USERSPACE_STACK_BOTTOM: u64 = 0x2_0000_0000;
/// Initial user stack pointer; one page below is pre-mapped at task creation.
pub const USERSPACE_STACK_TOP: u64 = 0x2_4000_0000;

/// User heap window, grown one page at a time by the ALLOC system call.
pub const USERSPACE_HEAP: u64 = 0x4_0000_0000;
pub const USERSPACE_HEAP_END: u64 = 0x20_0000_0000;

/// Upper bound of all unprivileged addresses.
pub const USERSPACE_END: u64 = 0x20_0000_0000;

/// Every task owns a fixed kernel stack of this size.
pub const KERNEL_STACK_SIZE: u64 = 1 << 20;

/// QEMU `virt` board physical layout.
pub mod platform {
    /// Start of DRAM.
    pub const RAM_BASE: u64 = 0x4000_0000;
    /// Size of DRAM the kernel manages.
    pub const RAM_SIZE: u64 = 1 << 30;

    /// PL011 UART MMIO window.
    pub const UART_BASE: u64 = 0x0900_0000;
    /// GICv2 distributor.
    pub const GICD_BASE: u64 = 0x0800_0000;
    /// GICv2 CPU interface.
    pub const GICC_BASE: u64 = 0x0801_0000;

    /// EL1 physical timer PPI.
    pub const TIMER_IRQ: u32 = 30;
}
