/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The engine proper: bitmap allocation, inode table access, block
//! addressing and the unaligned read/write path.

use alloc::{string::String, vec, vec::Vec};

use rigel_base::{dirent, syscall::NodeKind};

use crate::device::BlockDevice;
use crate::inode::{Inode, DIRECT_BLOCKS, INODE_RECORD_SIZE};
use crate::meta::{DiskLayout, DiskMeta};
use crate::{FsError, Result};

/// A mounted volume.
pub struct FileSystem<D: BlockDevice> {
    device: D,
    meta: DiskMeta,
    layout: DiskLayout,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Mount an existing volume, validating the superblock against the
    /// device geometry.
    pub fn open(device: D) -> Result<Self> {
        let mut block = vec![0u8; device.block_size()];
        device.read_block(0, &mut block);
        let meta = DiskMeta::from_bytes(&block)?;

        if meta.block_size != device.block_size() as u64
            || meta.required_size() != device.block_count() * meta.block_size
        {
            return Err(FsError::GeometryMismatch);
        }

        let layout = meta.layout();
        Ok(Self {
            device,
            meta,
            layout,
        })
    }

    /// Write a fresh volume: superblock, zeroed bitmaps, and the root
    /// directory as inode #0.
    pub fn format(mut device: D, meta: DiskMeta) -> Result<Self> {
        meta.validate()?;
        if meta.block_size != device.block_size() as u64
            || meta.required_size() != device.block_count() * meta.block_size
        {
            return Err(FsError::GeometryMismatch);
        }

        let layout = meta.layout();

        let mut block = vec![0u8; meta.block_size as usize];
        block[..crate::meta::SUPERBLOCK_SIZE].copy_from_slice(&meta.to_bytes());
        device.write_block(0, &block);

        // Both bitmaps start all-free.
        block.fill(0);
        for bid in layout.bid_bitmap_inode..layout.bid_inodes {
            device.write_block(bid, &block);
        }

        let mut fs = Self {
            device,
            meta,
            layout,
        };

        let root = fs.allocate_inode()?;
        assert_eq!(root, 0, "root must be the first inode");
        fs.set_inode(root, &Inode::empty(NodeKind::Directory))?;

        Ok(fs)
    }

    pub fn meta(&self) -> DiskMeta {
        self.meta
    }

    /// The root directory is always inode #0.
    pub fn root(&self) -> u64 {
        0
    }

    pub fn inode_kind(&self, id: u64) -> Result<NodeKind> {
        Ok(self.get_inode(id)?.kind)
    }

    pub fn inode_size(&self, id: u64) -> Result<u64> {
        Ok(self.get_inode(id)?.size)
    }

    /// Create a child of `parent`. Duplicate names are rejected; the new
    /// inode id is returned.
    pub fn create(&mut self, parent: u64, name: &str, kind: NodeKind) -> Result<u64> {
        if name.is_empty() || name.bytes().any(|b| b == b'/' || b == 0) {
            return Err(FsError::InvalidName);
        }

        let parent_inode = self.get_inode(parent)?;
        if parent_inode.kind != NodeKind::Directory {
            return Err(FsError::NotADirectory);
        }

        for (child_name, _) in self.children(parent)? {
            if child_name == name {
                return Err(FsError::DuplicateName);
            }
        }

        let id = self.allocate_inode()?;
        self.set_inode(id, &Inode::empty(kind))?;

        // Append the new entry to the parent's payload.
        let record = dirent::record_len(name.len());
        let new_parent_size = parent_inode.size + record as u64;
        let parent_inode = self.resize(parent, new_parent_size)?;

        let mut buf = vec![0u8; record];
        dirent::encode(&mut buf, name, id);
        self.write_extent(&parent_inode, new_parent_size - record as u64, &buf);

        Ok(id)
    }

    /// All `(name, inode id)` pairs of a directory, in insertion order.
    pub fn children(&self, id: u64) -> Result<Vec<(String, u64)>> {
        let inode = self.get_inode(id)?;
        if inode.kind != NodeKind::Directory {
            return Err(FsError::NotADirectory);
        }

        if inode.size == 0 {
            return Ok(Vec::new());
        }

        let mut payload = vec![0u8; inode.size as usize];
        self.read_extent(&inode, 0, &mut payload);

        Ok(dirent::Entries::new(&payload)
            .map(|(name, child)| (String::from(name), child))
            .collect())
    }

    /// Read file bytes at `offset`, clamping at EOF. Returns the byte count.
    pub fn read(&self, id: u64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let inode = self.get_inode(id)?;
        if inode.kind == NodeKind::Directory {
            return Err(FsError::NotAFile);
        }

        if buf.is_empty() || offset >= inode.size {
            return Ok(0);
        }

        let n = buf.len().min((inode.size - offset) as usize);
        self.read_extent(&inode, offset, &mut buf[..n]);
        Ok(n)
    }

    /// Write file bytes at `offset`, growing the inode first if needed.
    pub fn write(&mut self, id: u64, offset: u64, buf: &[u8]) -> Result<usize> {
        let inode = self.get_inode(id)?;
        if inode.kind == NodeKind::Directory {
            return Err(FsError::NotAFile);
        }

        if buf.is_empty() {
            return Ok(0);
        }

        let end = offset + buf.len() as u64;
        let inode = if end > inode.size {
            self.resize(id, end)?
        } else {
            inode
        };

        self.write_extent(&inode, offset, buf);
        Ok(buf.len())
    }

    /// Grow or shrink an inode to `new_size` bytes, allocating or releasing
    /// data blocks and the indirect block as the count crosses the direct
    /// limit. New bytes read back as zeroes.
    pub fn resize(&mut self, id: u64, new_size: u64) -> Result<Inode> {
        let mut inode = self.get_inode(id)?;
        let old_size = inode.size;
        if old_size == new_size {
            return Ok(inode);
        }

        let bs = self.meta.block_size;
        let old_blocks = (old_size + bs - 1) / bs;
        let new_blocks = (new_size + bs - 1) / bs;

        if new_size > self.meta.max_file_size() {
            return Err(FsError::TooLarge);
        }

        inode.size = new_size;

        if old_blocks == new_blocks {
            self.set_inode(id, &inode)?;
            if new_size > old_size {
                self.zero_partial_tail(&inode, old_size);
            }
            return Ok(inode);
        }

        if old_blocks < new_blocks {
            if old_blocks < DIRECT_BLOCKS as u64 && new_blocks >= DIRECT_BLOCKS as u64 {
                inode.block_l1 = self.allocate_block()?;
            }

            let zero = vec![0u8; bs as usize];
            for index in old_blocks..new_blocks {
                let bid = self.allocate_block()?;
                self.set_block_id(&mut inode, index, bid)?;
                self.write_data_block(bid, &zero);
            }

            if old_size % bs != 0 {
                self.zero_partial_tail(&inode, old_size);
            }
        } else {
            for index in new_blocks..old_blocks {
                let bid = self.block_id_of(&inode, index)?;
                self.deallocate_block(bid);
            }
            if old_blocks >= DIRECT_BLOCKS as u64 && new_blocks < DIRECT_BLOCKS as u64 {
                self.deallocate_block(inode.block_l1);
                inode.block_l1 = 0;
            }
        }

        self.set_inode(id, &inode)?;
        Ok(inode)
    }

    // ---------------------------------------------------------------------
    // Block addressing
    // ---------------------------------------------------------------------

    fn block_id_of(&self, inode: &Inode, index: u64) -> Result<u64> {
        let per_indirect = self.meta.block_size / 8;
        if index < DIRECT_BLOCKS as u64 {
            Ok(inode.blocks_l0[index as usize])
        } else if index < DIRECT_BLOCKS as u64 + per_indirect {
            let mut block = vec![0u8; self.meta.block_size as usize];
            self.read_data_block(inode.block_l1, &mut block);
            let at = (index - DIRECT_BLOCKS as u64) as usize * 8;
            let mut cell = [0u8; 8];
            cell.copy_from_slice(&block[at..at + 8]);
            Ok(u64::from_le_bytes(cell))
        } else {
            Err(FsError::TooLarge)
        }
    }

    fn set_block_id(&mut self, inode: &mut Inode, index: u64, bid: u64) -> Result<()> {
        let per_indirect = self.meta.block_size / 8;
        if index < DIRECT_BLOCKS as u64 {
            inode.blocks_l0[index as usize] = bid;
            Ok(())
        } else if index < DIRECT_BLOCKS as u64 + per_indirect {
            let mut block = vec![0u8; self.meta.block_size as usize];
            self.read_data_block(inode.block_l1, &mut block);
            let at = (index - DIRECT_BLOCKS as u64) as usize * 8;
            block[at..at + 8].copy_from_slice(&bid.to_le_bytes());
            self.write_data_block(inode.block_l1, &block);
            Ok(())
        } else {
            Err(FsError::TooLarge)
        }
    }

    // ---------------------------------------------------------------------
    // Unaligned data path
    // ---------------------------------------------------------------------

    /// Read `buf.len()` bytes at `offset`: partial leading block, whole
    /// middle blocks, partial trailing block.
    fn read_extent(&self, inode: &Inode, offset: u64, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }

        let bs = self.meta.block_size;
        let len = buf.len() as u64;
        let begin_block = offset / bs;
        let end_block = (offset + len - 1) / bs;

        let mut scratch = vec![0u8; bs as usize];
        for index in begin_block..=end_block {
            let seg_begin = offset.max(index * bs);
            let seg_end = (offset + len).min((index + 1) * bs);
            let at = (seg_begin - offset) as usize;
            let seg = (seg_end - seg_begin) as usize;

            let bid = self.block_id_of(inode, index).expect("extent inside inode");
            if seg as u64 == bs {
                self.read_data_block(bid, &mut buf[at..at + seg]);
            } else {
                self.read_data_block(bid, &mut scratch);
                let inner = (seg_begin - index * bs) as usize;
                buf[at..at + seg].copy_from_slice(&scratch[inner..inner + seg]);
            }
        }
    }

    /// Mirror image of [`Self::read_extent`]; partial blocks go through a
    /// read-modify-write.
    fn write_extent(&mut self, inode: &Inode, offset: u64, buf: &[u8]) {
        if buf.is_empty() {
            return;
        }

        let bs = self.meta.block_size;
        let len = buf.len() as u64;
        let begin_block = offset / bs;
        let end_block = (offset + len - 1) / bs;

        let mut scratch = vec![0u8; bs as usize];
        for index in begin_block..=end_block {
            let seg_begin = offset.max(index * bs);
            let seg_end = (offset + len).min((index + 1) * bs);
            let at = (seg_begin - offset) as usize;
            let seg = (seg_end - seg_begin) as usize;

            let bid = self.block_id_of(inode, index).expect("extent inside inode");
            if seg as u64 == bs {
                self.write_data_block(bid, &buf[at..at + seg]);
            } else {
                self.read_data_block(bid, &mut scratch);
                let inner = (seg_begin - index * bs) as usize;
                scratch[inner..inner + seg].copy_from_slice(&buf[at..at + seg]);
                self.write_data_block(bid, &scratch);
            }
        }
    }

    /// Zero the bytes of the block containing `from` that lie at or after
    /// it. Keeps regrown tails reading back as zeroes.
    fn zero_partial_tail(&mut self, inode: &Inode, from: u64) {
        let bs = self.meta.block_size;
        let inner = (from % bs) as usize;
        if inner == 0 {
            return;
        }

        let index = from / bs;
        let bid = self.block_id_of(inode, index).expect("extent inside inode");
        let mut scratch = vec![0u8; bs as usize];
        self.read_data_block(bid, &mut scratch);
        scratch[inner..].fill(0);
        self.write_data_block(bid, &scratch);
    }

    // ---------------------------------------------------------------------
    // Inode table
    // ---------------------------------------------------------------------

    fn get_inode(&self, id: u64) -> Result<Inode> {
        if id >= self.meta.inode_count {
            return Err(FsError::BadInode { id });
        }

        let per_block = self.meta.block_size / INODE_RECORD_SIZE as u64;
        let bid = self.layout.bid_inodes + id / per_block;
        let at = (id % per_block) as usize * INODE_RECORD_SIZE;

        let mut block = vec![0u8; self.meta.block_size as usize];
        self.device.read_block(bid, &mut block);
        Inode::decode(&block[at..at + INODE_RECORD_SIZE])
    }

    fn set_inode(&mut self, id: u64, inode: &Inode) -> Result<()> {
        if id >= self.meta.inode_count {
            return Err(FsError::BadInode { id });
        }

        let per_block = self.meta.block_size / INODE_RECORD_SIZE as u64;
        let bid = self.layout.bid_inodes + id / per_block;
        let at = (id % per_block) as usize * INODE_RECORD_SIZE;

        let mut block = vec![0u8; self.meta.block_size as usize];
        self.device.read_block(bid, &mut block);
        block[at..at + INODE_RECORD_SIZE].copy_from_slice(&inode.encode());
        self.device.write_block(bid, &block);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Bitmaps
    // ---------------------------------------------------------------------

    fn bitmap_allocate(&mut self, first_bid: u64, bits: u64) -> Option<u64> {
        let bs = self.meta.block_size;
        let blocks = (bits + 8 * bs - 1) / (8 * bs);

        let mut block = vec![0u8; bs as usize];
        for rel in 0..blocks {
            self.device.read_block(first_bid + rel, &mut block);
            for byte_at in 0..block.len() {
                if block[byte_at] == 0xff {
                    continue;
                }
                for bit in 0..8 {
                    let index = rel * 8 * bs + byte_at as u64 * 8 + bit;
                    if index >= bits {
                        return None;
                    }
                    if block[byte_at] & (1 << bit) == 0 {
                        block[byte_at] |= 1 << bit;
                        self.device.write_block(first_bid + rel, &block);
                        return Some(index);
                    }
                }
            }
        }
        None
    }

    fn bitmap_release(&mut self, first_bid: u64, index: u64) {
        let bs = self.meta.block_size;
        let bid = first_bid + index / (8 * bs);
        let at = (index % (8 * bs)) as usize;

        let mut block = vec![0u8; bs as usize];
        self.device.read_block(bid, &mut block);
        debug_assert!(block[at / 8] & (1 << (at % 8)) != 0, "double release");
        block[at / 8] &= !(1 << (at % 8));
        self.device.write_block(bid, &block);
    }

    fn allocate_inode(&mut self) -> Result<u64> {
        self.bitmap_allocate(self.layout.bid_bitmap_inode, self.meta.inode_count)
            .ok_or(FsError::OutOfInodes)
    }

    fn allocate_block(&mut self) -> Result<u64> {
        self.bitmap_allocate(self.layout.bid_bitmap_data, self.meta.block_count)
            .ok_or(FsError::OutOfBlocks)
    }

    fn deallocate_block(&mut self, bid: u64) {
        self.bitmap_release(self.layout.bid_bitmap_data, bid);
    }

    // ---------------------------------------------------------------------
    // Device access
    // ---------------------------------------------------------------------

    fn read_data_block(&self, id: u64, buf: &mut [u8]) {
        self.device.read_block(self.layout.bid_data + id, buf);
    }

    fn write_data_block(&mut self, id: u64, buf: &[u8]) {
        self.device.write_block(self.layout.bid_data + id, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    fn fresh(meta: DiskMeta) -> (Vec<u8>, DiskMeta) {
        (vec![0u8; meta.required_size() as usize], meta)
    }

    fn small_meta() -> DiskMeta {
        DiskMeta {
            block_size: 1024,
            block_count: 256,
            inode_count: 64,
        }
    }

    #[test]
    fn format_creates_an_empty_root() {
        let (mut image, meta) = fresh(small_meta());
        let fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();

        assert_eq!(fs.root(), 0);
        assert_eq!(fs.inode_kind(0).unwrap(), NodeKind::Directory);
        assert_eq!(fs.inode_size(0).unwrap(), 0);
        assert!(fs.children(0).unwrap().is_empty());
    }

    #[test]
    fn formatted_image_mounts_again() {
        let (mut image, meta) = fresh(small_meta());
        {
            let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();
            fs.create(0, "etc", NodeKind::Directory).unwrap();
        }
        let fs = FileSystem::open(MemoryDisk::new(&mut image, 1024)).unwrap();
        let children = fs.children(0).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "etc");
    }

    #[test]
    fn children_come_back_in_insertion_order() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();

        let etc = fs.create(0, "etc", NodeKind::Directory).unwrap();
        fs.create(etc, "passwd", NodeKind::File).unwrap();
        fs.create(etc, "group", NodeKind::File).unwrap();
        fs.create(etc, "shadow", NodeKind::File).unwrap();

        let names: Vec<_> = fs
            .children(etc)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["passwd", "group", "shadow"]);
    }

    #[test]
    fn duplicate_and_invalid_names_are_rejected() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();

        fs.create(0, "etc", NodeKind::Directory).unwrap();
        assert_eq!(
            fs.create(0, "etc", NodeKind::File),
            Err(FsError::DuplicateName)
        );
        assert_eq!(fs.create(0, "a/b", NodeKind::File), Err(FsError::InvalidName));
        assert_eq!(fs.create(0, "", NodeKind::File), Err(FsError::InvalidName));
    }

    #[test]
    fn write_then_read_round_trips_across_blocks() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();
        let file = fs.create(0, "blob", NodeKind::File).unwrap();

        // An unaligned extent spanning four blocks.
        let data: Vec<u8> = (0..3000u32).map(|v| (v % 251) as u8).collect();
        assert_eq!(fs.write(file, 700, &data).unwrap(), data.len());
        assert_eq!(fs.inode_size(file).unwrap(), 700 + data.len() as u64);

        let mut back = vec![0u8; data.len()];
        assert_eq!(fs.read(file, 700, &mut back).unwrap(), data.len());
        assert_eq!(back, data);

        // Leading gap reads back as zeroes.
        let mut head = vec![0xaau8; 700];
        assert_eq!(fs.read(file, 0, &mut head).unwrap(), 700);
        assert!(head.iter().all(|&b| b == 0));
    }

    #[test]
    fn read_clamps_at_eof() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();
        let file = fs.create(0, "short", NodeKind::File).unwrap();

        fs.write(file, 0, b"twelve bytes").unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(fs.read(file, 0, &mut buf).unwrap(), 12);
        assert_eq!(&buf[..12], b"twelve bytes");
        assert_eq!(fs.read(file, 12, &mut buf).unwrap(), 0);
        assert_eq!(fs.read(file, 400, &mut buf).unwrap(), 0);
    }

    #[test]
    fn indirect_boundary_allocates_once_and_survives() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();
        let file = fs.create(0, "large", NodeKind::File).unwrap();

        // Twenty blocks worth of data forces single-indirect addressing.
        let data: Vec<u8> = (0..20 * 1024u32).map(|v| (v % 241) as u8).collect();
        fs.write(file, 0, &data).unwrap();

        let mut back = vec![0u8; data.len()];
        fs.read(file, 0, &mut back).unwrap();
        assert_eq!(back, data);

        // Shrink below the boundary, then regrow; the tail must be zeroes.
        fs.resize(file, 1024).unwrap();
        fs.resize(file, 15 * 1024).unwrap();

        let mut tail = vec![0xffu8; 1024];
        fs.read(file, 13 * 1024, &mut tail).unwrap();
        assert!(tail.iter().all(|&b| b == 0));

        // The first kilobyte survived the shrink.
        let mut head = vec![0u8; 1024];
        fs.read(file, 0, &mut head).unwrap();
        assert_eq!(head, data[..1024]);
    }

    #[test]
    fn regrow_inside_one_block_zeroes_the_gap() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();
        let file = fs.create(0, "gap", NodeKind::File).unwrap();

        fs.write(file, 0, &[0x55u8; 600]).unwrap();
        fs.resize(file, 100).unwrap();
        fs.resize(file, 600).unwrap();

        let mut back = vec![0u8; 600];
        fs.read(file, 0, &mut back).unwrap();
        assert!(back[..100].iter().all(|&b| b == 0x55));
        assert!(back[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn inode_exhaustion_reports_out_of_inodes() {
        let meta = DiskMeta {
            block_size: 1024,
            block_count: 64,
            inode_count: 4,
        };
        let (mut image, meta) = fresh(meta);
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();

        // Root is inode 0; three more fit.
        fs.create(0, "a", NodeKind::File).unwrap();
        fs.create(0, "b", NodeKind::File).unwrap();
        fs.create(0, "c", NodeKind::File).unwrap();
        assert_eq!(
            fs.create(0, "d", NodeKind::File),
            Err(FsError::OutOfInodes)
        );
    }

    #[test]
    fn directory_payload_uses_the_dirent_format() {
        let (mut image, meta) = fresh(small_meta());
        let mut fs = FileSystem::format(MemoryDisk::new(&mut image, 1024), meta).unwrap();

        let id = fs.create(0, "passwd", NodeKind::File).unwrap();
        assert_eq!(
            fs.inode_size(0).unwrap(),
            dirent::record_len("passwd".len()) as u64
        );

        let inode = fs.get_inode(0).unwrap();
        let mut payload = vec![0u8; inode.size as usize];
        fs.read_extent(&inode, 0, &mut payload);

        let parsed: Vec<_> = dirent::Entries::new(&payload).collect();
        assert_eq!(parsed, vec![("passwd", id)]);
    }
}
