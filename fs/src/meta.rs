/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Superblock and volume layout arithmetic.

use crate::{FsError, Result};
use crate::inode::INODE_RECORD_SIZE;

/// Serialized superblock length at the start of block 0.
pub const SUPERBLOCK_SIZE: usize = 24;

/// The superblock: three numbers from which everything else follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskMeta {
    /// Block size in bytes; a power of two.
    pub block_size: u64,
    /// Number of data blocks.
    pub block_count: u64,
    /// Number of inode records.
    pub inode_count: u64,
}

/// Block indices of every region, derived from a [`DiskMeta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLayout {
    pub bid_bitmap_inode: u64,
    pub bid_bitmap_data: u64,
    pub bid_inodes: u64,
    pub bid_data: u64,
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

impl DiskMeta {
    /// Parse from the head of block 0.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < SUPERBLOCK_SIZE {
            return Err(FsError::BadSuperblock);
        }
        let word = |at: usize| {
            let mut cell = [0u8; 8];
            cell.copy_from_slice(&raw[at..at + 8]);
            u64::from_le_bytes(cell)
        };
        let meta = Self {
            block_size: word(0),
            block_count: word(8),
            inode_count: word(16),
        };
        meta.validate()?;
        Ok(meta)
    }

    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut out = [0u8; SUPERBLOCK_SIZE];
        out[0..8].copy_from_slice(&self.block_size.to_le_bytes());
        out[8..16].copy_from_slice(&self.block_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.inode_count.to_le_bytes());
        out
    }

    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two()
            || self.block_size < SUPERBLOCK_SIZE as u64
            || self.block_size % INODE_RECORD_SIZE as u64 != 0
            || self.block_count == 0
            || self.inode_count == 0
        {
            return Err(FsError::BadSuperblock);
        }
        Ok(())
    }

    /// Where each region starts.
    pub fn layout(&self) -> DiskLayout {
        let bits_per_block = 8 * self.block_size;
        let inodes_per_block = self.block_size / INODE_RECORD_SIZE as u64;

        let bid_bitmap_inode = 1;
        let bid_bitmap_data = bid_bitmap_inode + div_ceil(self.inode_count, bits_per_block);
        let bid_inodes = bid_bitmap_data + div_ceil(self.block_count, bits_per_block);
        let bid_data = bid_inodes + div_ceil(self.inode_count, inodes_per_block);

        DiskLayout {
            bid_bitmap_inode,
            bid_bitmap_data,
            bid_inodes,
            bid_data,
        }
    }

    /// Exact image size in bytes.
    pub fn required_size(&self) -> u64 {
        (self.layout().bid_data + self.block_count) * self.block_size
    }

    /// Largest file representable with direct + single-indirect addressing.
    pub fn max_file_size(&self) -> u64 {
        (10 + self.block_size / 8) * self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_the_reference_volume() {
        let meta = DiskMeta {
            block_size: 1024,
            block_count: 128 * 1024,
            inode_count: 1024,
        };

        let layout = meta.layout();
        assert_eq!(layout.bid_bitmap_inode, 1);
        // 1024 inode bits fit one block.
        assert_eq!(layout.bid_bitmap_data, 2);
        // 131072 data bits need 16 blocks.
        assert_eq!(layout.bid_inodes, 18);
        // 1024 inodes at 8 per block need 128 blocks.
        assert_eq!(layout.bid_data, 146);

        assert_eq!(meta.required_size(), (146 + 128 * 1024) * 1024);
        assert_eq!(meta.required_size() % meta.block_size, 0);
    }

    #[test]
    fn superblock_round_trip() {
        let meta = DiskMeta {
            block_size: 4096,
            block_count: 77,
            inode_count: 12,
        };
        let parsed = DiskMeta::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn bogus_superblocks_are_rejected() {
        assert_eq!(
            DiskMeta::from_bytes(&[0u8; SUPERBLOCK_SIZE]),
            Err(FsError::BadSuperblock)
        );
        let odd = DiskMeta {
            block_size: 1000,
            block_count: 1,
            inode_count: 1,
        };
        assert_eq!(DiskMeta::from_bytes(&odd.to_bytes()), Err(FsError::BadSuperblock));
    }
}
