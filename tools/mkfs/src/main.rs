/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Host-side disk-image tool.
//!
//! ```text
//! rigel-mkfs initialize <image> <block-size> <block-count> <inode-count>
//! rigel-mkfs add <image> <path-in-image> <host-file>
//! rigel-mkfs info <image>
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use rigel_base::syscall::NodeKind;
use rigel_fs::{DiskMeta, FileSystem, MemoryDisk};

#[derive(Parser)]
#[command(name = "rigel-mkfs", about = "Format and fill Rigel disk images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a fresh, empty image.
    Initialize {
        image: PathBuf,
        block_size: u64,
        block_count: u64,
        inode_count: u64,
    },
    /// Copy a host file into the image, creating parent directories.
    Add {
        image: PathBuf,
        /// Absolute destination path inside the image.
        name: String,
        /// Host file with the contents.
        file: PathBuf,
    },
    /// Dump the superblock and the directory tree.
    Info { image: PathBuf },
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Initialize {
            image,
            block_size,
            block_count,
            inode_count,
        } => initialize(&image, block_size, block_count, inode_count),
        Command::Add { image, name, file } => add(&image, &name, &file),
        Command::Info { image } => info(&image),
    }
}

fn initialize(image: &PathBuf, block_size: u64, block_count: u64, inode_count: u64) -> Result<()> {
    let meta = DiskMeta {
        block_size,
        block_count,
        inode_count,
    };
    meta.validate()
        .map_err(|e| anyhow::anyhow!("bad geometry: {}", e))?;

    let mut bytes = vec![0u8; meta.required_size() as usize];
    FileSystem::format(MemoryDisk::new(&mut bytes, block_size as usize), meta)
        .map_err(|e| anyhow::anyhow!("format failed: {}", e))?;

    fs::write(image, bytes).with_context(|| format!("writing {}", image.display()))?;
    Ok(())
}

fn add(image: &PathBuf, name: &str, file: &PathBuf) -> Result<()> {
    if !name.starts_with('/') || name.ends_with('/') {
        bail!("destination must be an absolute file path");
    }

    let mut bytes =
        fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let contents =
        fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    let meta = DiskMeta::from_bytes(&bytes).map_err(|e| anyhow::anyhow!("bad image: {}", e))?;
    let mut volume = FileSystem::open(MemoryDisk::new(&mut bytes, meta.block_size as usize))
        .map_err(|e| anyhow::anyhow!("cannot mount: {}", e))?;

    // Walk the directories, creating what is missing.
    let components: Vec<&str> = name.split('/').filter(|c| !c.is_empty()).collect();
    let (file_name, dirs) = components.split_last().unwrap();

    let mut parent = volume.root();
    for dir in dirs {
        parent = match lookup_child(&volume, parent, dir)? {
            Some(id) => id,
            None => volume
                .create(parent, dir, NodeKind::Directory)
                .map_err(|e| anyhow::anyhow!("mkdir {}: {}", dir, e))?,
        };
    }

    let id = match lookup_child(&volume, parent, file_name)? {
        Some(id) => {
            volume.resize(id, 0)
                .map_err(|e| anyhow::anyhow!("truncate: {}", e))?;
            id
        }
        None => volume
            .create(parent, file_name, NodeKind::File)
            .map_err(|e| anyhow::anyhow!("create {}: {}", file_name, e))?,
    };

    volume.write(id, 0, &contents)
        .map_err(|e| anyhow::anyhow!("write: {}", e))?;

    drop(volume);
    fs::write(image, bytes).with_context(|| format!("writing {}", image.display()))?;
    Ok(())
}

fn info(image: &PathBuf) -> Result<()> {
    let mut bytes =
        fs::read(image).with_context(|| format!("reading {}", image.display()))?;

    let meta = DiskMeta::from_bytes(&bytes).map_err(|e| anyhow::anyhow!("bad image: {}", e))?;
    println!("Block size:  {}", meta.block_size);
    println!("Block count: {}", meta.block_count);
    println!("Inode count: {}", meta.inode_count);
    println!("Size:        {}", meta.required_size());

    let volume = FileSystem::open(MemoryDisk::new(&mut bytes, meta.block_size as usize))
        .map_err(|e| anyhow::anyhow!("cannot mount: {}", e))?;

    println!("root");
    dump(&volume, volume.root(), 1)?;
    Ok(())
}

fn dump(volume: &FileSystem<MemoryDisk>, inode: u64, depth: usize) -> Result<()> {
    for (name, child) in volume
        .children(inode)
        .map_err(|e| anyhow::anyhow!("listing: {}", e))?
    {
        println!("{}{}", "    ".repeat(depth), name);
        if volume
            .inode_kind(child)
            .map_err(|e| anyhow::anyhow!("inode {}: {}", child, e))?
            == NodeKind::Directory
        {
            dump(volume, child, depth + 1)?;
        }
    }
    Ok(())
}

fn lookup_child(
    volume: &FileSystem<MemoryDisk>,
    parent: u64,
    name: &str,
) -> Result<Option<u64>> {
    let children = volume
        .children(parent)
        .map_err(|e| anyhow::anyhow!("listing: {}", e))?;
    Ok(children
        .into_iter()
        .find(|(child, _)| child.as_str() == name)
        .map(|(_, id)| id))
}
