/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Device drivers for the `virt` board: the PL011 UART and the GICv2. The
//! kernel proper only sees them through the interface traits (and through
//! the console registry for the UART).

pub mod gic;
pub mod pl011;

use core::marker::PhantomData;
use core::ops;

use rigel_base::defs::{platform, KA_BEGIN};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Driver interfaces.
pub mod interface {
    /// What the trap dispatcher needs from an interrupt controller.
    pub trait InterruptController {
        /// Unmask one interrupt line.
        fn enable(&self, irq: u32);

        /// Make a line edge-triggered.
        fn set_edge_triggered(&self, irq: u32);

        /// Give a line the highest urgency.
        fn set_priority(&self, irq: u32, priority: u8);

        /// Drop any pending state on a line.
        fn clear_pending(&self, irq: u32);

        /// The id of the highest-priority pending interrupt, if any.
        fn acknowledge(&self) -> Option<u32>;

        /// Signal end-of-interrupt.
        fn complete(&self, irq: u32);
    }
}

/// Zero-cost typed view over a block of memory-mapped registers.
pub struct MMIODerefWrapper<T> {
    base_addr: usize,
    phantom: PhantomData<fn() -> T>,
}

impl<T> MMIODerefWrapper<T> {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// `base_addr` must be the mapped virtual address of the peripheral.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self {
            base_addr,
            phantom: PhantomData,
        }
    }
}

impl<T> ops::Deref for MMIODerefWrapper<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*(self.base_addr as *const _) }
    }
}

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

/// The serial console, behind the high-half device window.
pub static PL011: pl011::Pl011Uart =
    unsafe { pl011::Pl011Uart::new((KA_BEGIN + platform::UART_BASE) as usize) };

/// The interrupt controller.
static GICV2: gic::GicV2 = unsafe {
    gic::GicV2::new(
        (KA_BEGIN + platform::GICD_BASE) as usize,
        (KA_BEGIN + platform::GICC_BASE) as usize,
    )
};

/// The registered interrupt controller.
pub fn gic() -> &'static impl interface::InterruptController {
    &GICV2
}

/// Bring up both drivers and route the scheduling timer's PPI.
pub fn init() {
    use interface::InterruptController;

    PL011.init();

    GICV2.init();
    GICV2.set_edge_triggered(platform::TIMER_IRQ);
    GICV2.set_priority(platform::TIMER_IRQ, 0);
    GICV2.clear_pending(platform::TIMER_IRQ);
    GICV2.enable(platform::TIMER_IRQ);
}
