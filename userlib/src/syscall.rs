/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Typed wrappers over the raw supervisor-call trampoline. Aggregate
//! arguments are marshalled as arrays of u64 cells in the caller's memory.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use rigel_base::dirent;
use rigel_base::syscall::{NodeKind, NodeStat, OpenMode, SyscallId, TaskState};

use crate::arch::syscall;

/// Append one byte to the kernel log sink.
pub fn kputchar(byte: u8) {
    syscall(SyscallId::Putchar, byte as u64);
}

/// One pending byte from the serial console, if any.
pub fn kgetchar() -> Option<u8> {
    let value = syscall(SyscallId::Getchar, 0) as i64;
    if value < 0 {
        None
    } else {
        Some(value as u8)
    }
}

/// Map one page of heap at `va`.
pub fn allocate_page(va: u64) -> bool {
    syscall(SyscallId::Alloc, va) == 1
}

/// Child pid in the parent, 0 in the child.
pub fn fork() -> i64 {
    syscall(SyscallId::Fork, 0) as i64
}

/// Replace this process's image. Only returns on failure.
pub fn exec(path: &str) -> i64 {
    let cstr = cstring(path);
    syscall(SyscallId::Exec, cstr.as_ptr() as u64) as i64
}

pub fn exit() -> ! {
    syscall(SyscallId::Exit, 0);
    unreachable!("EXIT returned");
}

pub fn get_pid() -> u64 {
    syscall(SyscallId::GetPid, 0)
}

pub fn task_stat(pid: u64) -> TaskState {
    match syscall(SyscallId::TaskStat, pid) {
        0 => TaskState::Running,
        1 => TaskState::Terminated,
        _ => TaskState::Invalid,
    }
}

/// Set this process's scheduling weight; the kernel clamps into [10, 1000]
/// and reports the applied value.
pub fn set_priority(priority: u16) -> u16 {
    syscall(SyscallId::SetPriority, priority as u64) as u16
}

pub fn sem_create(initial: u64) -> u64 {
    syscall(SyscallId::SemCreate, initial)
}

pub fn sem_wait(sem: u64) -> i64 {
    syscall(SyscallId::SemWait, sem) as i64
}

pub fn sem_signal(sem: u64) -> i64 {
    syscall(SyscallId::SemSignal, sem) as i64
}

pub fn sem_signal_after(sem: u64, microseconds: u64) -> i64 {
    let params = [sem, microseconds];
    syscall(SyscallId::SemSignalAfter, params.as_ptr() as u64) as i64
}

pub fn sem_destroy(sem: u64) -> i64 {
    syscall(SyscallId::SemDestroy, sem) as i64
}

/// Sleep by parking on a throwaway semaphore with a timed signal.
pub fn sleep_us(microseconds: u64) {
    let sem = sem_create(0);
    sem_signal_after(sem, microseconds);
    sem_wait(sem);
    sem_destroy(sem);
}

pub fn open(path: &str, mode: OpenMode) -> i64 {
    let cstr = cstring(path);
    let params = [cstr.as_ptr() as u64, mode as u64];
    syscall(SyscallId::FdOpen, params.as_ptr() as u64) as i64
}

pub fn close(fd: i64) -> i64 {
    syscall(SyscallId::FdClose, fd as u64) as i64
}

pub fn create(path: &str, kind: NodeKind) -> i64 {
    let cstr = cstring(path);
    let params = [cstr.as_ptr() as u64, kind as u64];
    syscall(SyscallId::FdCreate, params.as_ptr() as u64) as i64
}

pub fn read(fd: i64, buf: &mut [u8]) -> i64 {
    let params = [fd as u64, buf.as_mut_ptr() as u64, buf.len() as u64];
    syscall(SyscallId::FdRead, params.as_ptr() as u64) as i64
}

pub fn write(fd: i64, buf: &[u8]) -> i64 {
    let params = [fd as u64, buf.as_ptr() as u64, buf.len() as u64];
    syscall(SyscallId::FdWrite, params.as_ptr() as u64) as i64
}

pub fn seek(fd: i64, offset: u64) -> i64 {
    let params = [fd as u64, offset];
    syscall(SyscallId::FdSeek, params.as_ptr() as u64) as i64
}

pub fn stat(fd: i64) -> Option<NodeStat> {
    let mut stat = NodeStat::default();
    let params = [fd as u64, &mut stat as *mut NodeStat as u64];
    if (syscall(SyscallId::FdStat, params.as_ptr() as u64) as i64) < 0 {
        return None;
    }
    Some(stat)
}

/// List a directory handle: `(name, inode id)` pairs in directory order.
///
/// A first call with a modest buffer either succeeds or reports the exact
/// size to retry with.
pub fn get_children(fd: i64) -> Result<Vec<(String, u64)>, i64> {
    let mut buf = vec![0u8; 4096];
    let mut params = [fd as u64, buf.as_mut_ptr() as u64, buf.len() as u64];
    let mut ret = syscall(SyscallId::FdChildren, params.as_ptr() as u64) as i64;

    if ret > 0 {
        buf = vec![0u8; ret as usize];
        params[1] = buf.as_mut_ptr() as u64;
        params[2] = buf.len() as u64;
        ret = syscall(SyscallId::FdChildren, params.as_ptr() as u64) as i64;
    }
    if ret != 0 {
        return Err(ret);
    }

    Ok(dirent::Entries::new(&buf)
        .map(|(name, id)| (String::from(name), id))
        .collect())
}

/// NUL-terminate a path for the kernel.
fn cstring(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 1);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}
