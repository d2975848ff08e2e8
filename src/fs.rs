//! The public filesystem facade.
//!
//! [`FileSystem`] owns the backing store and exposes the path-level
//! operations. Everything below it works in inums; paths stop existing at
//! this layer's boundary.

use std::cmp::min;
use std::path::Path;

use log::debug;

use crate::block::BlockStore;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{self, Mode};
use crate::{directory, path};

/// Metadata snapshot for a single inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inum: u32,
    pub mode: Mode,
    pub size: u32,
    pub refs: u32,
}

pub struct FileSystem {
    store: BlockStore,
}

impl FileSystem {
    /// Opens (or creates) a file-backed image. A fresh image is formatted
    /// on first open; an already-formatted one mounts as-is.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = BlockStore::open(path)?;
        let mut fs = Self { store };
        if fs.store.formatted() {
            debug!("mounting existing image");
        } else {
            fs.format()?;
        }
        Ok(fs)
    }

    /// A formatted filesystem with no backing file. Contents vanish on drop.
    pub fn in_memory() -> Result<Self> {
        let mut fs = Self {
            store: BlockStore::new_in_memory(),
        };
        fs.format()?;
        Ok(fs)
    }

    fn format(&mut self) -> Result<()> {
        debug!(
            "formatting: {NUM_BLOCKS} blocks of {BLOCK_SIZE} bytes, {NUM_INODES} inodes"
        );
        self.store.reserve_system_blocks();
        directory::init_root(&mut self.store)
    }

    /// Writes the in-memory image back to the backing file, if any.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let inum = path::resolve(&self.store, path)?;
        let ino = inode::inode(&self.store, inum);
        Ok(Stat {
            inum,
            mode: Mode::from_bits_retain(ino.mode),
            size: ino.size,
            refs: ino.refs,
        })
    }

    /// Reads from `offset` into `buf`, stopping at end of file. Returns the
    /// number of bytes read; reading at or past the end reads zero bytes.
    pub fn read(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let inum = path::resolve(&self.store, path)?;
        let ino = inode::inode(&self.store, inum);
        if ino.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if offset >= ino.size {
            return Ok(0);
        }
        let n = min(buf.len(), (ino.size - offset) as usize);
        let mut pos = offset as usize;
        let mut done = 0;
        while done < n {
            let in_block = pos % BLOCK_SIZE;
            let chunk = min(n - done, BLOCK_SIZE - in_block);
            let bnum = inode::resolve_block(&self.store, &ino, pos as u32);
            buf[done..done + chunk]
                .copy_from_slice(&self.store.block(bnum)[in_block..in_block + chunk]);
            pos += chunk;
            done += chunk;
        }
        Ok(n)
    }

    /// Writes `data` at `offset`, growing the file as needed. Writes are
    /// clipped at the maximum file size; a write starting at or past it is
    /// out of range. Returns the number of bytes written.
    pub fn write(&mut self, path: &str, offset: u32, data: &[u8]) -> Result<usize> {
        let inum = path::resolve(&self.store, path)?;
        let ino = inode::inode(&self.store, inum);
        if ino.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE {
            return Err(FsError::OutOfRange);
        }
        let end = min(offset as u64 + data.len() as u64, MAX_FILE_SIZE as u64) as u32;
        if end > ino.size {
            inode::grow(&mut self.store, inum, end)?;
        }
        let ino = inode::inode(&self.store, inum);
        let n = (end - offset) as usize;
        let mut pos = offset as usize;
        let mut done = 0;
        while done < n {
            let in_block = pos % BLOCK_SIZE;
            let chunk = min(n - done, BLOCK_SIZE - in_block);
            let bnum = inode::resolve_block(&self.store, &ino, pos as u32);
            self.store.block_mut(bnum)[in_block..in_block + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            pos += chunk;
            done += chunk;
        }
        debug!("write {path:?}: {n} bytes at {offset}");
        Ok(n)
    }

    /// Sets the file's size exactly, freeing or allocating blocks as
    /// needed. Bytes exposed by growing read back as zero.
    pub fn truncate(&mut self, path: &str, size: u32) -> Result<()> {
        let inum = path::resolve(&self.store, path)?;
        let ino = inode::inode(&self.store, inum);
        if ino.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if size > ino.size {
            inode::grow(&mut self.store, inum, size)
        } else {
            inode::shrink(&mut self.store, inum, size);
            Ok(())
        }
    }

    /// Creates an empty regular file with the caller's permission bits;
    /// the type bits come from the operation itself. Every precondition is
    /// checked before anything is allocated, so a failed mknod changes
    /// nothing.
    pub fn mknod(&mut self, path: &str, mode: Mode) -> Result<()> {
        let (parent, leaf) = path::resolve_parent(&self.store, path)?;
        self.check_new_entry(parent, leaf)?;
        let inum = inode::alloc_inode(&mut self.store)?;
        let mut ino = inode::inode(&self.store, inum);
        ino.mode = (mode.bits() & !Mode::TYPE_MASK.bits()) | Mode::REGULAR.bits();
        inode::put_inode(&mut self.store, inum, &ino);
        directory::put(&mut self.store, parent, leaf, inum)?;
        debug!("mknod {path:?} -> inode {inum}");
        Ok(())
    }

    /// Creates an empty directory holding its two mandatory entries, with
    /// the caller's permission bits.
    pub fn mkdir(&mut self, path: &str, mode: Mode) -> Result<()> {
        let (parent, leaf) = path::resolve_parent(&self.store, path)?;
        self.check_new_entry(parent, leaf)?;
        let inum = inode::alloc_inode(&mut self.store)?;
        let mut ino = inode::inode(&self.store, inum);
        ino.mode = (mode.bits() & !Mode::TYPE_MASK.bits()) | Mode::DIRECTORY.bits();
        inode::put_inode(&mut self.store, inum, &ino);
        directory::put(&mut self.store, parent, leaf, inum)?;
        directory::put(&mut self.store, inum, ".", inum)?;
        directory::put(&mut self.store, inum, "..", parent)?;
        debug!("mkdir {path:?} -> inode {inum}");
        Ok(())
    }

    /// Preconditions shared by mknod and mkdir: the parent is a directory
    /// with a free slot, the name is valid, and nothing holds it yet.
    fn check_new_entry(&self, parent: u32, leaf: &str) -> Result<()> {
        directory::encode_name(leaf)?;
        match directory::lookup(&self.store, parent, leaf) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }
        let dir = inode::inode(&self.store, parent);
        if dir.entry_count as usize == ENTRIES_PER_BLOCK {
            return Err(FsError::Full);
        }
        Ok(())
    }

    /// Removes one link to a regular file. The inode and its blocks are
    /// freed when the last link goes away.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, leaf) = path::resolve_parent(&self.store, path)?;
        let inum = directory::lookup(&self.store, parent, leaf)?;
        if inode::inode(&self.store, inum).is_dir() {
            return Err(FsError::IsADirectory);
        }
        directory::delete(&mut self.store, parent, leaf)?;
        debug!("unlink {path:?}");
        Ok(())
    }

    /// Adds a second name for an existing regular file. Directories cannot
    /// be hard-linked.
    pub fn link(&mut self, existing: &str, new: &str) -> Result<()> {
        let inum = path::resolve(&self.store, existing)?;
        if inode::inode(&self.store, inum).is_dir() {
            return Err(FsError::IsADirectory);
        }
        let (parent, leaf) = path::resolve_parent(&self.store, new)?;
        directory::put(&mut self.store, parent, leaf, inum)?;
        debug!("link {existing:?} -> {new:?}");
        Ok(())
    }

    /// Moves an entry to a new name, possibly under a different parent.
    /// The new name is linked before the old one is unlinked; the target
    /// keeps existing throughout. Renaming onto an existing name fails,
    /// as does moving a directory into its own subtree.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (from_parent, from_leaf) = path::resolve_parent(&self.store, from)?;
        if from_leaf == "." || from_leaf == ".." {
            return Err(FsError::InvalidName);
        }
        let inum = directory::lookup(&self.store, from_parent, from_leaf)?;
        let (to_parent, to_leaf) = path::resolve_parent(&self.store, to)?;
        let moving_dir = inode::inode(&self.store, inum).is_dir();
        if moving_dir && self.is_within(inum, to_parent)? {
            return Err(FsError::InvalidName);
        }
        directory::put(&mut self.store, to_parent, to_leaf, inum)?;
        if moving_dir {
            directory::reparent(&mut self.store, inum, to_parent);
        }
        directory::delete(&mut self.store, from_parent, from_leaf)?;
        debug!("rename {from:?} -> {to:?}");
        Ok(())
    }

    /// Whether `dir` is `inum` itself or lies anywhere below it. Moving a
    /// directory under its own subtree would orphan the whole subtree as
    /// an unreachable cycle.
    fn is_within(&self, inum: u32, mut dir: u32) -> Result<bool> {
        loop {
            if dir == inum {
                return Ok(true);
            }
            if dir == ROOT_INUM {
                return Ok(false);
            }
            dir = directory::lookup(&self.store, dir, "..")?;
        }
    }

    /// Removes an empty directory. Empty means it holds nothing beyond its
    /// two mandatory entries. The root cannot be removed.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, leaf) = path::resolve_parent(&self.store, path)?;
        let inum = directory::lookup(&self.store, parent, leaf)?;
        let ino = inode::inode(&self.store, inum);
        if !ino.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if ino.entry_count > 2 {
            return Err(FsError::NotEmpty);
        }
        directory::delete(&mut self.store, parent, leaf)?;
        debug!("rmdir {path:?}");
        Ok(())
    }

    /// Names stored in the directory, in storage order, `"."` and `".."`
    /// included.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let inum = path::resolve(&self.store, path)?;
        directory::list(&self.store, inum)
    }

    /// Replaces the permission bits. The file-type bits are kept.
    pub fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        let inum = path::resolve(&self.store, path)?;
        let mut ino = inode::inode(&self.store, inum);
        let kept = ino.mode & Mode::TYPE_MASK.bits();
        ino.mode = kept | (mode.bits() & !Mode::TYPE_MASK.bits());
        inode::put_inode(&mut self.store, inum, &ino);
        Ok(())
    }

    /// Data blocks currently marked used, the reserved system blocks
    /// included.
    pub fn used_blocks(&self) -> usize {
        self.store.used_blocks()
    }

    pub fn used_inodes(&self) -> usize {
        self.store.used_inodes()
    }
}
