/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The namespace: one rooted tree over the on-medium file system, in-memory
//! fifos and the synthetic `/proc` and `/kernel` subtrees, unified behind
//! shared open-node objects.
//!
//! A [`SharedNode`] is the system-wide open-file object: at most one exists
//! per underlying inode at any time, found through the `inode -> node`
//! memo. Tasks hold [`crate::task::Handle`]s that refer to nodes by id;
//! the node keeps per-direction pid multisets so that destruction is a
//! question about emptiness of id sets, not about pointer cycles.

mod fifo;

pub use fifo::{FifoRing, FIFO_CAPACITY};

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec::Vec;

use rigel_base::dirent;
use rigel_base::syscall::{NodeKind, OpenMode};
use rigel_fs::{BlockDevice, FileSystem, FsError};
use snafu::Snafu;

use crate::task::Pid;

/// Identifies a [`SharedNode`] inside the namespace. Ids are monotonically
/// assigned and not recycled.
pub type NodeId = u64;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum NsError {
    /// Paths must be absolute.
    #[snafu(display("path is not absolute"))]
    InvalidPath,

    /// A component does not exist.
    #[snafu(display("no such path"))]
    NotFound,

    /// An intermediate component, or a create parent, is not a directory.
    #[snafu(display("not a directory"))]
    NotADirectory,

    /// Directories cannot be opened for writing.
    #[snafu(display("directories are read-only"))]
    DirectoryWrite,

    /// The last writer cannot leave while the ring still holds bytes.
    #[snafu(display("fifo still holds unread bytes"))]
    FifoNotDrained,

    /// No open node with that id.
    #[snafu(display("unknown node"))]
    UnknownNode,

    /// The engine refused.
    #[snafu(context(false), display("storage: {}", source))]
    Storage { source: FsError },
}

pub type Result<T, E = NsError> = core::result::Result<T, E>;

/// A system-wide open object; see module docs.
pub struct SharedNode {
    pub inode: u64,
    pub kind: NodeKind,
    fifo: Option<FifoRing>,
    readers: Vec<Pid>,
    writers: Vec<Pid>,
}

/// The namespace over one mounted volume.
pub struct Namespace<D: BlockDevice> {
    fs: FileSystem<D>,
    nodes: BTreeMap<NodeId, SharedNode>,
    by_inode: BTreeMap<u64, NodeId>,
    next_node: NodeId,
}

impl<D: BlockDevice> Namespace<D> {
    pub fn new(fs: FileSystem<D>) -> Self {
        Self {
            fs,
            nodes: BTreeMap::new(),
            by_inode: BTreeMap::new(),
            next_node: 0,
        }
    }

    /// Resolve an absolute path to an inode id. Trailing slashes and empty
    /// components are ignored; relative paths are refused.
    pub fn lookup(&self, path: &str) -> Result<u64> {
        let mut current = self.fs.root();
        for component in components_of(path)? {
            if self.fs.inode_kind(current)? != NodeKind::Directory {
                return Err(NsError::NotADirectory);
            }
            current = self
                .fs
                .children(current)?
                .into_iter()
                .find(|(name, _)| name.as_str() == component)
                .map(|(_, id)| id)
                .ok_or(NsError::NotFound)?;
        }
        Ok(current)
    }

    /// Open `path` for `pid`, returning the shared node id.
    ///
    /// Opening a regular file for writing truncates it; opening a directory
    /// for writing is refused; opening a fifo registers the pid on the
    /// respective end of the ring.
    pub fn open(&mut self, pid: Pid, path: &str, mode: OpenMode) -> Result<NodeId> {
        let inode = self.lookup(path)?;
        let kind = self.fs.inode_kind(inode)?;
        if kind == NodeKind::Directory && mode == OpenMode::Write {
            return Err(NsError::DirectoryWrite);
        }

        if kind == NodeKind::File && mode == OpenMode::Write {
            self.fs.resize(inode, 0)?;
        }

        let id = match self.by_inode.get(&inode) {
            Some(&id) => id,
            None => {
                let id = self.next_node;
                self.next_node += 1;
                self.nodes.insert(
                    id,
                    SharedNode {
                        inode,
                        kind,
                        fifo: (kind == NodeKind::Fifo).then(FifoRing::new),
                        readers: Vec::new(),
                        writers: Vec::new(),
                    },
                );
                self.by_inode.insert(inode, id);
                id
            }
        };

        self.register(pid, id, mode)?;
        Ok(id)
    }

    /// Add `pid` to a node's reader or writer set. Fork uses this directly
    /// to mirror the parent's handles onto the child.
    pub fn register(&mut self, pid: Pid, id: NodeId, mode: OpenMode) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(NsError::UnknownNode)?;
        match mode {
            OpenMode::Read => node.readers.push(pid),
            OpenMode::Write => node.writers.push(pid),
        }
        Ok(())
    }

    /// Drop one of `pid`'s references to a node; the node is released once
    /// both sets empty out. The last writer of a fifo is refused while the
    /// ring still holds bytes.
    pub fn close(&mut self, pid: Pid, id: NodeId) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(NsError::UnknownNode)?;

        if node.kind == NodeKind::Fifo
            && node.writers.len() == 1
            && node.writers[0] == pid
            && !node.fifo.as_ref().unwrap().is_empty()
        {
            return Err(NsError::FifoNotDrained);
        }

        remove_one(&mut node.readers, pid);
        remove_one(&mut node.writers, pid);

        if node.readers.is_empty() && node.writers.is_empty() {
            let inode = node.inode;
            self.nodes.remove(&id);
            self.by_inode.remove(&inode);
        }
        Ok(())
    }

    /// Teardown variant of [`Self::close`], used by exit and exec: the pid
    /// leaves unconditionally. A fifo node with undelivered bytes stays
    /// alive even with empty sets so a later reader can still drain it;
    /// its next close re-evaluates destruction.
    pub fn release(&mut self, pid: Pid, id: NodeId) {
        let node = match self.nodes.get_mut(&id) {
            Some(node) => node,
            None => return,
        };

        remove_one(&mut node.readers, pid);
        remove_one(&mut node.writers, pid);

        let drained = node
            .fifo
            .as_ref()
            .map(|ring| ring.is_empty())
            .unwrap_or(true);
        if node.readers.is_empty() && node.writers.is_empty() && drained {
            let inode = node.inode;
            self.nodes.remove(&id);
            self.by_inode.remove(&inode);
        }
    }

    /// Create a file, directory or fifo at an absolute path whose parent
    /// already exists.
    pub fn create(&mut self, path: &str, kind: NodeKind) -> Result<u64> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.lookup(parent_path)?;
        if self.fs.inode_kind(parent)? != NodeKind::Directory {
            return Err(NsError::NotADirectory);
        }
        Ok(self.fs.create(parent, name, kind)?)
    }

    /// Read from a node. Files go through the engine at the given offset;
    /// fifos ignore the offset and deliver whatever the ring holds.
    pub fn read(&mut self, id: NodeId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let node = self.nodes.get_mut(&id).ok_or(NsError::UnknownNode)?;
        match node.kind {
            NodeKind::Fifo => Ok(node.fifo.as_mut().unwrap().pop(buf)),
            _ => Ok(self.fs.read(node.inode, offset, buf)?),
        }
    }

    /// Write to a node; the mirror of [`Self::read`]. Fifo writes go short
    /// when the ring fills.
    pub fn write(&mut self, id: NodeId, offset: u64, buf: &[u8]) -> Result<usize> {
        let node = self.nodes.get_mut(&id).ok_or(NsError::UnknownNode)?;
        match node.kind {
            NodeKind::Fifo => Ok(node.fifo.as_mut().unwrap().push(buf)),
            _ => Ok(self.fs.write(node.inode, offset, buf)?),
        }
    }

    /// Current size: inode size for files and directories, byte count for
    /// fifos.
    pub fn size(&self, id: NodeId) -> Result<u64> {
        let node = self.nodes.get(&id).ok_or(NsError::UnknownNode)?;
        match node.kind {
            NodeKind::Fifo => Ok(node.fifo.as_ref().unwrap().len() as u64),
            _ => Ok(self.fs.inode_size(node.inode)?),
        }
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind> {
        Ok(self.nodes.get(&id).ok_or(NsError::UnknownNode)?.kind)
    }

    /// Serialize a directory's entries into `buf` in the wire format of
    /// [`rigel_base::dirent`]. Returns 0 on success or the required buffer
    /// size when `buf` is too small; the caller retries with that size.
    pub fn children_into(&self, id: NodeId, buf: &mut [u8]) -> Result<u64> {
        let node = self.nodes.get(&id).ok_or(NsError::UnknownNode)?;
        if node.kind != NodeKind::Directory {
            return Err(NsError::NotADirectory);
        }

        let children = self.fs.children(node.inode)?;
        let needed: usize = children
            .iter()
            .map(|(name, _)| dirent::record_len(name.len()))
            .sum();
        if needed > buf.len() {
            return Ok(needed as u64);
        }

        let mut at = 0;
        for (name, child) in &children {
            at += dirent::encode(&mut buf[at..], name, *child);
        }
        buf[at..].fill(0);
        Ok(0)
    }

    /// The per-process fifo subtree created at fork/create time.
    pub fn ensure_proc_fifos(&mut self, pid: Pid) -> Result<()> {
        if self.lookup("/proc").is_err() {
            self.create("/proc", NodeKind::Directory)?;
        }
        self.create(&format!("/proc/{}", pid), NodeKind::Directory)?;
        self.create(&format!("/proc/{}/fifo", pid), NodeKind::Directory)?;
        self.create(&format!("/proc/{}/fifo/stdin", pid), NodeKind::Fifo)?;
        self.create(&format!("/proc/{}/fifo/stdout", pid), NodeKind::Fifo)?;
        Ok(())
    }

    /// The kernel log sink: `/kernel/log`, opened for writing by the kernel
    /// pseudo-pid 0.
    pub fn setup_kernel_log(&mut self) -> Result<NodeId> {
        self.create("/kernel", NodeKind::Directory)?;
        self.create("/kernel/log", NodeKind::Fifo)?;
        self.open(0, "/kernel/log", OpenMode::Write)
    }
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

/// The non-empty components of an absolute path.
fn components_of(path: &str) -> Result<impl Iterator<Item = &str>> {
    if !path.starts_with('/') {
        return Err(NsError::InvalidPath);
    }
    Ok(path.split('/').filter(|component| !component.is_empty()))
}

/// Split an absolute path into parent path and final component.
fn split_parent(path: &str) -> Result<(&str, &str)> {
    if !path.starts_with('/') {
        return Err(NsError::InvalidPath);
    }
    let trimmed = path.trim_end_matches('/');
    let cut = trimmed.rfind('/').ok_or(NsError::InvalidPath)?;
    let name = &trimmed[cut + 1..];
    if name.is_empty() {
        return Err(NsError::InvalidPath);
    }
    let parent = if cut == 0 { "/" } else { &trimmed[..cut] };
    Ok((parent, name))
}

fn remove_one(set: &mut Vec<Pid>, pid: Pid) {
    if let Some(at) = set.iter().position(|&p| p == pid) {
        set.remove(at);
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rigel_fs::{DiskMeta, MemoryDisk};
    use std::{vec, vec::Vec};

    fn fresh_namespace(image: &mut Vec<u8>) -> Namespace<MemoryDisk<'_>> {
        let meta = DiskMeta {
            block_size: 1024,
            block_count: 512,
            inode_count: 128,
        };
        *image = vec![0u8; meta.required_size() as usize];
        let fs = FileSystem::format(MemoryDisk::new(image, 1024), meta).unwrap();
        Namespace::new(fs)
    }

    #[test]
    fn path_normalization() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/a", NodeKind::Directory).unwrap();
        ns.create("/a/b", NodeKind::File).unwrap();

        assert_eq!(ns.lookup("/").unwrap(), 0);
        assert_eq!(ns.lookup("/a/b").unwrap(), ns.lookup("/a/b/").unwrap());
        assert_eq!(ns.lookup("/a//b").unwrap(), ns.lookup("/a/b").unwrap());
        assert_eq!(ns.lookup("a/b"), Err(NsError::InvalidPath));
        assert_eq!(ns.lookup("/missing"), Err(NsError::NotFound));
        assert_eq!(ns.lookup("/a/b/c"), Err(NsError::NotADirectory));
    }

    #[test]
    fn nodes_are_memoized_per_inode() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/data", NodeKind::File).unwrap();

        let first = ns.open(1, "/data", OpenMode::Read).unwrap();
        let second = ns.open(2, "/data", OpenMode::Read).unwrap();
        assert_eq!(first, second);

        // Releasing both references destroys the node; a later open makes a
        // fresh one.
        ns.close(1, first).unwrap();
        ns.close(2, first).unwrap();
        let third = ns.open(1, "/data", OpenMode::Read).unwrap();
        assert_ne!(third, first);
    }

    #[test]
    fn write_open_truncates_files_only() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/data", NodeKind::File).unwrap();

        let node = ns.open(1, "/data", OpenMode::Write).unwrap();
        ns.write(node, 0, b"abcdef").unwrap();
        assert_eq!(ns.size(node).unwrap(), 6);
        ns.close(1, node).unwrap();

        let node = ns.open(1, "/data", OpenMode::Write).unwrap();
        assert_eq!(ns.size(node).unwrap(), 0);
        ns.close(1, node).unwrap();

        assert_eq!(
            ns.open(1, "/", OpenMode::Write),
            Err(NsError::DirectoryWrite)
        );
    }

    #[test]
    fn file_reads_follow_offsets_fifos_do_not() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/file", NodeKind::File).unwrap();
        ns.create("/queue", NodeKind::Fifo).unwrap();

        let file = ns.open(1, "/file", OpenMode::Write).unwrap();
        ns.write(file, 0, b"0123456789").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(ns.read(file, 3, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"3456");

        let queue = ns.open(1, "/queue", OpenMode::Write).unwrap();
        ns.open(2, "/queue", OpenMode::Read).unwrap();
        ns.write(queue, 999, b"abcd").unwrap();
        assert_eq!(ns.read(queue, 999, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(ns.read(queue, 0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn last_writer_close_waits_for_drain() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/queue", NodeKind::Fifo).unwrap();

        let node = ns.open(1, "/queue", OpenMode::Write).unwrap();
        ns.open(2, "/queue", OpenMode::Read).unwrap();

        let payload = [7u8; 100];
        assert_eq!(ns.write(node, 0, &payload).unwrap(), 100);

        // The writer may not leave while bytes sit in the ring.
        assert_eq!(ns.close(1, node), Err(NsError::FifoNotDrained));

        let mut sink = [0u8; 100];
        assert_eq!(ns.read(node, 0, &mut sink).unwrap(), 100);
        assert_eq!(sink, payload);

        ns.close(1, node).unwrap();
        ns.close(2, node).unwrap();
        assert_eq!(ns.kind(node), Err(NsError::UnknownNode));
    }

    #[test]
    fn children_report_their_size_when_short() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/etc", NodeKind::Directory).unwrap();
        ns.create("/etc/passwd", NodeKind::File).unwrap();
        ns.create("/etc/group", NodeKind::File).unwrap();
        ns.create("/etc/shadow", NodeKind::File).unwrap();

        let etc = ns.open(1, "/etc", OpenMode::Read).unwrap();

        let mut small = [0u8; 8];
        let needed = ns.children_into(etc, &mut small).unwrap();
        assert!(needed as usize > small.len());

        let mut buf = vec![0u8; needed as usize];
        assert_eq!(ns.children_into(etc, &mut buf).unwrap(), 0);

        let names: Vec<_> = dirent::Entries::new(&buf).map(|(name, _)| name).collect();
        assert_eq!(names, ["passwd", "group", "shadow"]);
    }

    #[test]
    fn proc_fifos_and_kernel_log_subtrees() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);

        let log = ns.setup_kernel_log().unwrap();
        ns.write(log, 0, b"boot\n").unwrap();
        assert_eq!(ns.size(log).unwrap(), 5);

        ns.ensure_proc_fifos(1).unwrap();
        ns.ensure_proc_fifos(2).unwrap();
        assert!(ns.lookup("/proc/1/fifo/stdin").is_ok());
        assert!(ns.lookup("/proc/1/fifo/stdout").is_ok());
        assert!(ns.lookup("/proc/2/fifo/stdout").is_ok());

        let node = ns.open(3, "/proc/1/fifo/stdout", OpenMode::Read).unwrap();
        assert_eq!(ns.kind(node).unwrap(), NodeKind::Fifo);
    }

    #[test]
    fn fork_style_registration_shares_the_node() {
        let mut image = Vec::new();
        let mut ns = fresh_namespace(&mut image);
        ns.create("/queue", NodeKind::Fifo).unwrap();

        let node = ns.open(1, "/queue", OpenMode::Write).unwrap();
        ns.register(2, node, OpenMode::Write).unwrap();

        // Parent closes; the child still keeps the node alive.
        ns.close(1, node).unwrap();
        assert!(ns.kind(node).is_ok());
        ns.close(2, node).unwrap();
        assert_eq!(ns.kind(node), Err(NsError::UnknownNode));
    }
}
