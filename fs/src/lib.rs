/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The on-medium file-system engine.
//!
//! The layout is ext2-flavoured and fully described by the superblock:
//!
//! ```text
//! [ super ] [ inode-bitmap ] [ data-bitmap ] [ inode-table ] [ data-blocks ]
//! ```
//!
//! Inodes are packed 128-byte records addressed by index; a file's k-th data
//! block is direct for k < 10 and reached through one single-indirect block
//! otherwise. All on-medium integers are little-endian; bitmaps are LSB
//! first within each byte.
//!
//! The engine is `no_std` + `alloc` and generic over a [`BlockDevice`], so
//! the kernel drives it over the memdisk blob while the host image tool
//! drives it over a plain byte vector.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod device;
mod engine;
mod inode;
mod meta;

pub use device::{BlockDevice, MemoryDisk};
pub use engine::FileSystem;
pub use inode::{Inode, INODE_RECORD_SIZE};
pub use meta::{DiskLayout, DiskMeta, SUPERBLOCK_SIZE};

use snafu::Snafu;

/// Everything that can go wrong inside the engine.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum FsError {
    /// The superblock does not describe a sane volume.
    #[snafu(display("superblock is malformed"))]
    BadSuperblock,

    /// The device geometry disagrees with the superblock.
    #[snafu(display("device geometry does not match the superblock"))]
    GeometryMismatch,

    /// Every inode is in use.
    #[snafu(display("out of inodes"))]
    OutOfInodes,

    /// Every data block is in use.
    #[snafu(display("out of data blocks"))]
    OutOfBlocks,

    /// The inode id is outside the table.
    #[snafu(display("inode {} out of range", id))]
    BadInode { id: u64 },

    /// A directory operation was applied to a non-directory.
    #[snafu(display("not a directory"))]
    NotADirectory,

    /// A data operation was applied to a non-file.
    #[snafu(display("not a file"))]
    NotAFile,

    /// The parent directory already has a child of that name.
    #[snafu(display("duplicate name"))]
    DuplicateName,

    /// Names must be non-empty and contain neither '/' nor NUL.
    #[snafu(display("invalid name"))]
    InvalidName,

    /// The file would outgrow direct + single-indirect addressing.
    #[snafu(display("file exceeds maximum size"))]
    TooLarge,
}

pub type Result<T, E = FsError> = core::result::Result<T, E>;
