/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Packed 128-byte inode records.

use rigel_base::syscall::NodeKind;
use static_assertions::const_assert_eq;

use crate::{FsError, Result};

/// Size of one inode on the medium.
pub const INODE_RECORD_SIZE: usize = 128;

/// Direct block slots per inode.
pub const DIRECT_BLOCKS: usize = 10;

/// An inode as the engine sees it. The in-memory form mirrors the record:
/// kind, size in bytes, ten direct block ids and one single-indirect block
/// id; the rest of the record is reserved.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    pub kind: NodeKind,
    pub size: u64,
    pub blocks_l0: [u64; DIRECT_BLOCKS],
    pub block_l1: u64,
}

// kind(4) + reserved(4) + size(8) + 10 direct(80) + indirect(8) + tail pad(24)
const_assert_eq!(4 + 4 + 8 + 8 * DIRECT_BLOCKS + 8 + 24, INODE_RECORD_SIZE);

impl Inode {
    /// A fresh, empty inode of the given kind.
    pub fn empty(kind: NodeKind) -> Self {
        Self {
            kind,
            size: 0,
            blocks_l0: [0; DIRECT_BLOCKS],
            block_l1: 0,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        assert_eq!(raw.len(), INODE_RECORD_SIZE);

        let word = |at: usize| {
            let mut cell = [0u8; 8];
            cell.copy_from_slice(&raw[at..at + 8]);
            u64::from_le_bytes(cell)
        };

        let mut kind_raw = [0u8; 4];
        kind_raw.copy_from_slice(&raw[0..4]);
        let kind = NodeKind::from_raw(u32::from_le_bytes(kind_raw) as u64)
            .ok_or(FsError::BadSuperblock)?;

        let mut blocks_l0 = [0u64; DIRECT_BLOCKS];
        for (i, slot) in blocks_l0.iter_mut().enumerate() {
            *slot = word(16 + 8 * i);
        }

        Ok(Self {
            kind,
            size: word(8),
            blocks_l0,
            block_l1: word(16 + 8 * DIRECT_BLOCKS),
        })
    }

    pub fn encode(&self) -> [u8; INODE_RECORD_SIZE] {
        let mut out = [0u8; INODE_RECORD_SIZE];
        out[0..4].copy_from_slice(&(self.kind as u64 as u32).to_le_bytes());
        out[8..16].copy_from_slice(&self.size.to_le_bytes());
        for (i, slot) in self.blocks_l0.iter().enumerate() {
            out[16 + 8 * i..24 + 8 * i].copy_from_slice(&slot.to_le_bytes());
        }
        out[96..104].copy_from_slice(&self.block_l1.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        let mut inode = Inode::empty(NodeKind::Directory);
        inode.size = 12345;
        inode.blocks_l0 = [9, 8, 7, 6, 5, 4, 3, 2, 1, 0];
        inode.block_l1 = 42;

        let decoded = Inode::decode(&inode.encode()).unwrap();
        assert_eq!(decoded.kind, NodeKind::Directory);
        assert_eq!(decoded.size, 12345);
        assert_eq!(decoded.blocks_l0, inode.blocks_l0);
        assert_eq!(decoded.block_l1, 42);
    }

    #[test]
    fn garbage_kind_is_rejected() {
        let mut raw = [0xffu8; INODE_RECORD_SIZE];
        raw[0..4].copy_from_slice(&100u32.to_le_bytes());
        assert!(Inode::decode(&raw).is_err());
    }
}
