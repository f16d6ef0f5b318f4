/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! System-call dispatch.
//!
//! The dispatcher receives the raw id from x10 and the single argument from
//! x11; aggregate arguments arrive as a pointer to an array of u64 cells in
//! the caller's own memory, read through the caller's still-active low-half
//! translation. Any pointer reaching the kernel half is rejected before the
//! first dereference.
//!
//! Every failing call leaves a negative value in x0; magnitudes are small
//! integers distinct per call site:
//!
//! | call | -1 | -2 | -3 |
//! |---|---|---|---|
//! | FORK | frames or fifo subtree exhausted | | |
//! | EXEC | no such image or resources exhausted (caller keeps running) | | |
//! | SEM_WAIT | unknown id | | |
//! | SEM_SIGNAL | unknown id | count saturated | |
//! | SEM_SIGNAL_AFTER | bad pointer / unknown id | | |
//! | SEM_DESTROY | unknown id | waiters present | |
//! | FD_OPEN | bad pointer / bad path / bad mode | | |
//! | FD_CLOSE | unknown handle | fifo not drained | |
//! | FD_CREATE | bad pointer | bad path / bad kind | namespace refusal |
//! | FD_CHILDREN | bad pointer | unknown handle | not a directory |
//! | FD_READ / FD_WRITE | bad pointer | unknown handle | wrong mode / engine refusal |
//! | FD_SEEK | unknown handle | offset out of range | |
//! | FD_STAT | bad pointer | unknown handle | |

use alloc::string::String;
use alloc::vec::Vec;

use rigel_base::defs::KA_BEGIN;
use rigel_base::syscall::{clamp_priority, NodeKind, NodeStat, OpenMode, SyscallId};

use crate::console::{console, interface::SerialOps};
use crate::nsfs::{NodeId, NsError};
use crate::state::Kernel;
use crate::task::Handle;

const EFAULT: u64 = err(1);
const E2: u64 = err(2);
const E3: u64 = err(3);

const fn err(magnitude: u64) -> u64 {
    (-(magnitude as i64)) as u64
}

impl Kernel {
    /// Route one supervisor call. On return the current task (which may
    /// have changed) carries the value, if any, to load into x0.
    pub fn on_syscall(&mut self, id_raw: u64, arg: u64, now_us: u64) {
        let id = match SyscallId::from_raw(id_raw) {
            Some(id) => id,
            None => panic!("unknown syscall id {}", id_raw),
        };

        match id {
            SyscallId::Putchar => self.log_byte(arg as u8),
            SyscallId::Getchar => {
                let value = console()
                    .read_byte()
                    .map(|byte| byte as u64)
                    .unwrap_or((-1i64) as u64);
                self.current_mut().set_return_value(value);
            }
            SyscallId::Alloc => {
                let granted = self.allocate_user_page(arg);
                self.current_mut().set_return_value(granted as u64);
            }
            SyscallId::Fork => {
                // On success fork_current sets both return values itself; a
                // build that runs dry reports to the would-be parent only.
                if self.fork_current().is_err() {
                    self.current_mut().set_return_value(EFAULT);
                }
            }
            SyscallId::Exec => self.sys_exec(arg),
            SyscallId::Exit => self.exit_current(now_us),
            SyscallId::GetPid => {
                let pid = self.current().pid;
                self.current_mut().set_return_value(pid);
            }
            SyscallId::TaskStat => {
                let state = self.tasks.state(arg) as u64;
                self.current_mut().set_return_value(state);
            }
            SyscallId::SetPriority => {
                let priority = clamp_priority(arg);
                self.current_mut().priority = priority;
                self.current_mut().set_return_value(priority as u64);
            }
            SyscallId::SemCreate => {
                let sem = self.sems.create(arg);
                self.current_mut().set_return_value(sem);
            }
            SyscallId::SemWait => self.sys_sem_wait(arg, now_us),
            SyscallId::SemSignal => self.sys_sem_signal(arg),
            SyscallId::SemSignalAfter => self.sys_sem_signal_after(arg, now_us),
            SyscallId::SemDestroy => {
                use crate::sched::SemError;
                let value = match self.sems.destroy(arg) {
                    Ok(()) => 0,
                    Err(SemError::Unknown) => EFAULT,
                    Err(_) => E2,
                };
                self.current_mut().set_return_value(value);
            }
            SyscallId::FdOpen => self.sys_fd_open(arg),
            SyscallId::FdClose => self.sys_fd_close(arg),
            SyscallId::FdCreate => self.sys_fd_create(arg),
            SyscallId::FdChildren => self.sys_fd_children(arg),
            SyscallId::FdRead => self.sys_fd_rw(arg, OpenMode::Read),
            SyscallId::FdWrite => self.sys_fd_rw(arg, OpenMode::Write),
            SyscallId::FdSeek => self.sys_fd_seek(arg),
            SyscallId::FdStat => self.sys_fd_stat(arg),
        }
    }

    /// The current task's view of a handle, copied out.
    fn handle_info(&self, fd: u64) -> Option<(NodeId, OpenMode, u64)> {
        self.current()
            .handles
            .get(&fd)
            .map(|handle| (handle.node, handle.mode, handle.offset))
    }

    fn sys_exec(&mut self, path_ptr: u64) {
        let path = match read_user_cstr(path_ptr) {
            Some(path) => path,
            None => {
                self.current_mut().set_return_value(EFAULT);
                return;
            }
        };
        if self.exec_current(&path).is_err() {
            self.current_mut().set_return_value(EFAULT);
        }
    }

    fn sys_sem_wait(&mut self, sem: u64, now_us: u64) {
        use crate::sched::WaitOutcome;

        let pid = self.current().pid;
        match self.sems.wait(sem, pid) {
            // An unknown id is the only error a wait can produce.
            Err(_) => self.current_mut().set_return_value(EFAULT),
            Ok(WaitOutcome::Acquired) => self.current_mut().set_return_value(0),
            Ok(WaitOutcome::Blocked) => {
                // Leave the scheduler; the eventual signal resumes this
                // task with return value 0.
                self.sched.remove(&self.tasks, pid);
                self.reschedule(now_us);
            }
        }
    }

    fn sys_sem_signal(&mut self, sem: u64) {
        use crate::sched::{SemError, SignalOutcome};

        let value = match self.sems.signal(sem) {
            Err(SemError::Unknown) => EFAULT,
            Err(_) => E2,
            Ok(SignalOutcome::Incremented) => 0,
            Ok(SignalOutcome::Woken(pid)) => {
                self.wake(pid);
                0
            }
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_sem_signal_after(&mut self, params_ptr: u64, now_us: u64) {
        let value = match read_user_cells::<2>(params_ptr) {
            Some([sem, delay_us]) if self.sems.exists(sem) => {
                self.timers.arm(sem, now_us + delay_us);
                0
            }
            _ => EFAULT,
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_open(&mut self, params_ptr: u64) {
        let parsed = read_user_cells::<2>(params_ptr).and_then(|[path_ptr, mode_raw]| {
            Some((read_user_cstr(path_ptr)?, OpenMode::from_raw(mode_raw)?))
        });

        let value = match parsed {
            None => EFAULT,
            Some((path, mode)) => {
                let pid = self.current().pid;
                match self.ns.open(pid, &path, mode) {
                    Err(_) => EFAULT,
                    Ok(node) => self.current_mut().insert_handle(Handle {
                        node,
                        mode,
                        offset: 0,
                    }),
                }
            }
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_close(&mut self, fd: u64) {
        let pid = self.current().pid;
        let value = match self.handle_info(fd) {
            None => EFAULT,
            Some((node, _, _)) => match self.ns.close(pid, node) {
                // The handle survives a refused close so the writer can
                // retry once the reader has drained the ring.
                Err(NsError::FifoNotDrained) => E2,
                _ => {
                    self.current_mut().handles.remove(&fd);
                    0
                }
            },
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_create(&mut self, params_ptr: u64) {
        let value = match read_user_cells::<2>(params_ptr) {
            None => EFAULT,
            Some([path_ptr, kind_raw]) => {
                match (read_user_cstr(path_ptr), NodeKind::from_raw(kind_raw)) {
                    (Some(path), Some(kind)) => match self.ns.create(&path, kind) {
                        Ok(_) => 0,
                        Err(_) => E3,
                    },
                    _ => E2,
                }
            }
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_children(&mut self, params_ptr: u64) {
        let value = match read_user_cells::<3>(params_ptr) {
            None => EFAULT,
            Some([fd, buf_ptr, len]) if user_range_ok(buf_ptr, len) => {
                match self.handle_info(fd) {
                    None => E2,
                    Some((node, _, _)) => {
                        let buf = unsafe {
                            core::slice::from_raw_parts_mut(buf_ptr as *mut u8, len as usize)
                        };
                        match self.ns.children_into(node, buf) {
                            Ok(required) => required,
                            Err(_) => E3,
                        }
                    }
                }
            }
            Some(_) => EFAULT,
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_rw(&mut self, params_ptr: u64, direction: OpenMode) {
        let value = match read_user_cells::<3>(params_ptr) {
            None => EFAULT,
            Some([fd, buf_ptr, len]) if user_range_ok(buf_ptr, len) => {
                match self.handle_info(fd) {
                    None => E2,
                    Some((_, mode, _)) if mode != direction => E3,
                    Some((node, _, offset)) => {
                        let moved = match direction {
                            OpenMode::Read => {
                                let buf = unsafe {
                                    core::slice::from_raw_parts_mut(
                                        buf_ptr as *mut u8,
                                        len as usize,
                                    )
                                };
                                self.ns.read(node, offset, buf)
                            }
                            OpenMode::Write => {
                                let buf = unsafe {
                                    core::slice::from_raw_parts(buf_ptr as *const u8, len as usize)
                                };
                                self.ns.write(node, offset, buf)
                            }
                        };
                        match moved {
                            Ok(n) => {
                                let handle =
                                    self.current_mut().handles.get_mut(&fd).unwrap();
                                handle.offset += n as u64;
                                n as u64
                            }
                            Err(_) => E3,
                        }
                    }
                }
            }
            Some(_) => EFAULT,
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_seek(&mut self, params_ptr: u64) {
        let value = match read_user_cells::<2>(params_ptr) {
            None => EFAULT,
            Some([fd, offset]) => match self.handle_info(fd) {
                None => EFAULT,
                Some((node, _, _)) => {
                    let size = self.ns.size(node).unwrap_or(0);
                    if (offset as i64) < 0 || offset >= size {
                        E2
                    } else {
                        self.current_mut().handles.get_mut(&fd).unwrap().offset = offset;
                        0
                    }
                }
            },
        };
        self.current_mut().set_return_value(value);
    }

    fn sys_fd_stat(&mut self, params_ptr: u64) {
        let value = match read_user_cells::<2>(params_ptr) {
            None => EFAULT,
            Some([fd, stat_ptr])
                if user_range_ok(stat_ptr, core::mem::size_of::<NodeStat>() as u64) =>
            {
                match self.handle_info(fd) {
                    None => E2,
                    Some((node, _, _)) => {
                        let stat = NodeStat {
                            size: self.ns.size(node).unwrap_or(0),
                            kind: self.ns.kind(node).map(|k| k as u64).unwrap_or(0),
                        };
                        unsafe {
                            core::ptr::write_unaligned(stat_ptr as *mut NodeStat, stat);
                        }
                        0
                    }
                }
            }
            Some(_) => EFAULT,
        };
        self.current_mut().set_return_value(value);
    }
}

//--------------------------------------------------------------------------------------------------
// User memory access
//--------------------------------------------------------------------------------------------------

/// A user range is acceptable when it stays strictly inside the low half.
fn user_range_ok(ptr: u64, len: u64) -> bool {
    let end = match ptr.checked_add(len) {
        Some(end) => end,
        None => return false,
    };
    ptr < KA_BEGIN && end < KA_BEGIN
}

/// Fetch `N` u64 cells from the caller's memory.
fn read_user_cells<const N: usize>(ptr: u64) -> Option<[u64; N]> {
    if !user_range_ok(ptr, (N * 8) as u64) {
        return None;
    }
    let mut cells = [0u64; N];
    for (i, cell) in cells.iter_mut().enumerate() {
        *cell = unsafe { core::ptr::read_unaligned((ptr as *const u64).add(i)) };
    }
    Some(cells)
}

/// Longest path the kernel will read out of user memory.
const PATH_LIMIT: usize = 4096;

/// Fetch a NUL-terminated string from the caller's memory.
fn read_user_cstr(ptr: u64) -> Option<String> {
    let mut bytes = Vec::new();
    for i in 0..PATH_LIMIT as u64 {
        if !user_range_ok(ptr + i, 1) {
            return None;
        }
        let byte = unsafe { core::ptr::read((ptr + i) as *const u8) };
        if byte == 0 {
            return String::from_utf8(bytes).ok();
        }
        bytes.push(byte);
    }
    None
}
