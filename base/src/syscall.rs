/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The system-call ABI.
//!
//! A supervisor call carries the call id in `x10` and one argument in `x11`;
//! the result comes back in `x0`. Calls that need more than one scalar take
//! a pointer to an array of `u64` cells in the caller's own memory. The
//! kernel rejects any pointer that reaches into the kernel half-space.

use static_assertions::assert_eq_size;

/// System-call identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallId {
    /// Append one byte to the kernel log sink.
    Putchar = 0,
    /// Read one byte from the serial console, -1 if none pending.
    Getchar = 1,
    /// Map one page of user heap at the given virtual address.
    Alloc = 2,
    Fork = 3,
    Exec = 4,
    Exit = 5,
    GetPid = 6,
    /// Query the lifecycle state of an arbitrary task.
    TaskStat = 7,
    /// Clamp and set the caller's scheduling weight.
    SetPriority = 8,
    SemCreate = 9,
    SemWait = 10,
    SemSignal = 11,
    SemSignalAfter = 12,
    SemDestroy = 13,
    FdOpen = 14,
    FdClose = 15,
    FdCreate = 16,
    FdChildren = 17,
    FdRead = 18,
    FdWrite = 19,
    FdSeek = 20,
    FdStat = 21,
}

impl SyscallId {
    pub fn from_raw(raw: u64) -> Option<Self> {
        use SyscallId::*;
        Some(match raw {
            0 => Putchar,
            1 => Getchar,
            2 => Alloc,
            3 => Fork,
            4 => Exec,
            5 => Exit,
            6 => GetPid,
            7 => TaskStat,
            8 => SetPriority,
            9 => SemCreate,
            10 => SemWait,
            11 => SemSignal,
            12 => SemSignalAfter,
            13 => SemDestroy,
            14 => FdOpen,
            15 => FdClose,
            16 => FdCreate,
            17 => FdChildren,
            18 => FdRead,
            19 => FdWrite,
            20 => FdSeek,
            21 => FdStat,
            _ => return None,
        })
    }
}

/// Lifecycle answer of the TSTAT call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TaskState {
    Running = 0,
    Terminated = 1,
    Invalid = 2,
}

/// What a namespace entry is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum NodeKind {
    File = 0,
    Directory = 1,
    Fifo = 2,
}

impl NodeKind {
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(match raw {
            0 => NodeKind::File,
            1 => NodeKind::Directory,
            2 => NodeKind::Fifo,
            _ => return None,
        })
    }
}

/// Access mode of an open handle. Modes are exclusive; a task that needs
/// both directions opens the path twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum OpenMode {
    Read = 0,
    Write = 1,
}

impl OpenMode {
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(match raw {
            0 => OpenMode::Read,
            1 => OpenMode::Write,
            _ => return None,
        })
    }
}

/// Filled by FD_STAT through a caller-provided pointer.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct NodeStat {
    pub size: u64,
    /// A `NodeKind` as its raw value.
    pub kind: u64,
}

assert_eq_size!(NodeStat, [u64; 2]);

/// Scheduling weight bounds. Larger weight means a larger CPU share.
pub const PRIORITY_MIN: u16 = 10;
pub const PRIORITY_MAX: u16 = 1000;
pub const PRIORITY_DEFAULT: u16 = 1000;

/// Clamp a requested priority into the accepted band.
pub fn clamp_priority(raw: u64) -> u16 {
    if raw < PRIORITY_MIN as u64 {
        PRIORITY_MIN
    } else if raw > PRIORITY_MAX as u64 {
        PRIORITY_MAX
    } else {
        raw as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_ids_round_trip() {
        for raw in 0..=21 {
            let id = SyscallId::from_raw(raw).unwrap();
            assert_eq!(id as u64, raw);
        }
        assert!(SyscallId::from_raw(22).is_none());
    }

    #[test]
    fn priority_clamping() {
        assert_eq!(clamp_priority(0), PRIORITY_MIN);
        assert_eq!(clamp_priority(10), 10);
        assert_eq!(clamp_priority(500), 500);
        assert_eq!(clamp_priority(1000), 1000);
        assert_eq!(clamp_priority(u64::MAX), PRIORITY_MAX);
    }
}
