/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Block-device abstraction under the engine.

/// What the engine needs from its medium. Blocks are fixed-size and
/// addressed by index from the start of the volume.
pub trait BlockDevice {
    fn block_size(&self) -> usize;
    fn block_count(&self) -> u64;

    /// Read block `id` into `buf`; `buf.len() == block_size()`.
    fn read_block(&self, id: u64, buf: &mut [u8]);

    /// Write `buf` to block `id`; `buf.len() == block_size()`.
    fn write_block(&mut self, id: u64, buf: &[u8]);
}

/// A volume held entirely in memory: the kernel's memdisk blob, or a byte
/// vector inside the host tool.
pub struct MemoryDisk<'a> {
    memory: &'a mut [u8],
    block_size: usize,
}

impl<'a> MemoryDisk<'a> {
    /// Wrap `memory`, which must be a whole number of blocks.
    pub fn new(memory: &'a mut [u8], block_size: usize) -> Self {
        assert!(block_size.is_power_of_two());
        assert!(
            memory.len() % block_size == 0,
            "memdisk is not a whole number of blocks"
        );
        Self { memory, block_size }
    }
}

impl BlockDevice for MemoryDisk<'_> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.memory.len() / self.block_size) as u64
    }

    fn read_block(&self, id: u64, buf: &mut [u8]) {
        assert!(id < self.block_count(), "block read out of range");
        assert_eq!(buf.len(), self.block_size);
        let at = id as usize * self.block_size;
        buf.copy_from_slice(&self.memory[at..at + self.block_size]);
    }

    fn write_block(&mut self, id: u64, buf: &[u8]) {
        assert!(id < self.block_count(), "block write out of range");
        assert_eq!(buf.len(), self.block_size);
        let at = id as usize * self.block_size;
        self.memory[at..at + self.block_size].copy_from_slice(buf);
    }
}
