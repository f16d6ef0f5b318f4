/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 *
 * GICv2 distributor + CPU interface, single core.
 */

use tock_registers::{
    interfaces::{Readable, Writeable},
    register_structs,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

use super::{interface, MMIODerefWrapper};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

register_structs! {
    #[allow(non_snake_case)]
    GicdRegisters {
        (0x000 => CTLR: ReadWrite<u32>),
        (0x004 => _reserved1),
        (0x100 => ISENABLER: [ReadWrite<u32>; 32]),
        (0x180 => _reserved2),
        (0x280 => ICPENDR: [ReadWrite<u32>; 32]),
        (0x300 => _reserved3),
        (0x400 => IPRIORITYR: [ReadWrite<u32>; 255]),
        (0x7fc => _reserved4),
        (0xc00 => ICFGR: [ReadWrite<u32>; 64]),
        (0xd00 => @END),
    },

    #[allow(non_snake_case)]
    GiccRegisters {
        (0x000 => CTLR: ReadWrite<u32>),
        (0x004 => PMR: ReadWrite<u32>),
        (0x008 => BPR: ReadWrite<u32>),
        (0x00c => IAR: ReadOnly<u32>),
        (0x010 => EOIR: WriteOnly<u32>),
        (0x014 => @END),
    }
}

const CTLR_ENABLE: u32 = 1;
const PMR_ACCEPT_ALL: u32 = 0xff;
const BPR_NO_GROUPING: u32 = 0;

/// IAR/EOIR id mask; 1023 means spurious.
const IRQ_ID_MASK: u32 = 0x3ff;
const SPURIOUS: u32 = 1023;

/// ICFGR value for an edge-triggered line.
const CFG_EDGE: u32 = 2;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

pub struct GicV2 {
    gicd: MMIODerefWrapper<GicdRegisters>,
    gicc: MMIODerefWrapper<GiccRegisters>,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl GicV2 {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// The caller must provide the mapped virtual addresses of the
    /// distributor and the CPU interface.
    pub const unsafe fn new(gicd_base: usize, gicc_base: usize) -> Self {
        Self {
            gicd: MMIODerefWrapper::new(gicd_base),
            gicc: MMIODerefWrapper::new(gicc_base),
        }
    }

    /// Enable forwarding on both halves and accept every priority.
    pub fn init(&self) {
        self.gicd.CTLR.set(CTLR_ENABLE);
        self.gicc.CTLR.set(CTLR_ENABLE);
        self.gicc.PMR.set(PMR_ACCEPT_ALL);
        self.gicc.BPR.set(BPR_NO_GROUPING);
    }
}

//--------------------------------------------------------------------------------------------------
// OS Interface Code
//--------------------------------------------------------------------------------------------------

impl interface::InterruptController for GicV2 {
    fn enable(&self, irq: u32) {
        let cell = (irq / 32) as usize;
        self.gicd.ISENABLER[cell].set(1 << (irq % 32));
    }

    fn set_edge_triggered(&self, irq: u32) {
        let cell = (irq / 16) as usize;
        let shift = (irq % 16) * 2;
        let value = self.gicd.ICFGR[cell].get();
        self.gicd.ICFGR[cell].set((value & !(0b11 << shift)) | (CFG_EDGE << shift));
    }

    fn set_priority(&self, irq: u32, priority: u8) {
        let cell = (irq / 4) as usize;
        let shift = (irq % 4) * 8;
        let value = self.gicd.IPRIORITYR[cell].get();
        self.gicd.IPRIORITYR[cell].set((value & !(0xff << shift)) | ((priority as u32) << shift));
    }

    fn clear_pending(&self, irq: u32) {
        let cell = (irq / 32) as usize;
        self.gicd.ICPENDR[cell].set(1 << (irq % 32));
    }

    fn acknowledge(&self) -> Option<u32> {
        let id = self.gicc.IAR.get() & IRQ_ID_MASK;
        if id == SPURIOUS {
            None
        } else {
            Some(id)
        }
    }

    fn complete(&self, irq: u32) {
        self.gicc.EOIR.set(irq);
    }
}
