/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 *
 * PL011 UART on the virt board.
 * http://infocenter.arm.com/help/topic/com.arm.doc.ddi0183g/DDI0183G_uart_pl011_r1p5_trm.pdf
 */

use core::fmt;

use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

use crate::console::interface;
use crate::sync::TrapCell;

use super::MMIODerefWrapper;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

register_bitfields! {
    u32,

    /// Flag Register.
    FR [
        /// Transmit FIFO full.
        TXFF OFFSET(5) NUMBITS(1) [],

        /// Receive FIFO empty.
        RXFE OFFSET(4) NUMBITS(1) [],

        /// UART busy transmitting.
        BUSY OFFSET(3) NUMBITS(1) []
    ],

    /// Integer Baud rate divisor.
    IBRD [
        BAUD_DIVINT OFFSET(0) NUMBITS(16) []
    ],

    /// Fractional Baud rate divisor.
    FBRD [
        BAUD_DIVFRAC OFFSET(0) NUMBITS(6) []
    ],

    /// Line Control Register.
    LCR_H [
        /// Word length.
        WordLength OFFSET(5) NUMBITS(2) [
            EightBit = 0b11
        ],

        Fifos OFFSET(4) NUMBITS(1) [
            Disabled = 0,
            Enabled = 1
        ]
    ],

    /// Control Register.
    CR [
        /// Receive enable.
        RXE OFFSET(9) NUMBITS(1) [
            Disabled = 0,
            Enabled = 1
        ],

        /// Transmit enable.
        TXE OFFSET(8) NUMBITS(1) [
            Disabled = 0,
            Enabled = 1
        ],

        /// UART enable.
        UARTEN OFFSET(0) NUMBITS(1) [
            Disabled = 0,
            Enabled = 1
        ]
    ],

    /// Interrupt Clear Register.
    ICR [
        /// Meta field for all pending interrupts.
        ALL OFFSET(0) NUMBITS(11) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => Data: ReadWrite<u32>),
        (0x04 => _reserved1),
        (0x18 => Flag: ReadOnly<u32, FR::Register>),
        (0x1c => _reserved2),
        (0x24 => IntegerBaudRate: WriteOnly<u32, IBRD::Register>),
        (0x28 => FractionalBaudRate: WriteOnly<u32, FBRD::Register>),
        (0x2c => LineControl: ReadWrite<u32, LCR_H::Register>),
        (0x30 => Control: WriteOnly<u32, CR::Register>),
        (0x34 => _reserved3),
        (0x44 => InterruptClear: WriteOnly<u32, ICR::Register>),
        (0x48 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

struct Pl011Inner {
    registers: Registers,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

pub struct Pl011Uart {
    inner: TrapCell<Pl011Inner>,
}

/// The virt board feeds the UART a fixed 24 MHz reference clock.
const UART_CLOCK: u64 = 24_000_000;
const BAUD_RATE: u32 = 115_200;

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl Pl011Inner {
    /// # Safety
    ///
    /// See [`Pl011Uart::new`].
    const unsafe fn new(base_addr: usize) -> Self {
        Self {
            registers: Registers::new(base_addr),
        }
    }

    /// 115200 8N1 with FIFOs on.
    fn prepare(&mut self) {
        self.registers.Control.set(0);
        self.flush();
        self.registers.InterruptClear.write(ICR::ALL::SET);

        // Divisor = 64 * clock / (16 * rate); low six bits are the
        // fractional part.
        let value = 4 * UART_CLOCK / BAUD_RATE as u64;
        self.registers
            .IntegerBaudRate
            .write(IBRD::BAUD_DIVINT.val(((value >> 6) & 0xffff) as u32));
        self.registers
            .FractionalBaudRate
            .write(FBRD::BAUD_DIVFRAC.val((value & 0x3f) as u32));

        self.registers
            .LineControl
            .write(LCR_H::WordLength::EightBit + LCR_H::Fifos::Enabled);
        self.registers
            .Control
            .write(CR::UARTEN::Enabled + CR::TXE::Enabled + CR::RXE::Enabled);
    }

    fn flush(&self) {
        while self.registers.Flag.is_set(FR::BUSY) {
            core::hint::spin_loop();
        }
    }

    fn write_byte(&mut self, byte: u8) {
        while self.registers.Flag.is_set(FR::TXFF) {
            core::hint::spin_loop();
        }
        self.registers.Data.set(byte as u32);
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.registers.Flag.is_set(FR::RXFE) {
            return None;
        }
        Some(self.registers.Data.get() as u8)
    }
}

impl fmt::Write for Pl011Inner {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl Pl011Uart {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// The caller must provide the mapped virtual address of a PL011.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self {
            inner: TrapCell::new(Pl011Inner::new(base_addr)),
        }
    }

    pub fn init(&self) {
        self.inner.with(|inner| inner.prepare());
    }
}

//--------------------------------------------------------------------------------------------------
// OS Interface Code
//--------------------------------------------------------------------------------------------------

impl interface::SerialOps for Pl011Uart {
    fn write_byte(&self, byte: u8) {
        self.inner.with(|inner| inner.write_byte(byte));
    }

    fn read_byte(&self) -> Option<u8> {
        self.inner.with(|inner| inner.read_byte())
    }
}

impl interface::ConsoleOps for Pl011Uart {}

impl interface::Write for Pl011Uart {
    fn write_fmt(&self, args: fmt::Arguments) -> fmt::Result {
        self.inner.with(|inner| fmt::Write::write_fmt(inner, args))
    }
}

impl interface::All for Pl011Uart {}
