//! Directory entries and the reference-counted entry lifecycle.
//!
//! Every link-count change in the filesystem goes through [`put`] and
//! [`delete`]: a stored entry contributes exactly one to the refs of the
//! inode it names. That covers the parent's leaf entry, the directory's own
//! `"."`, and each child's stored `".."` with a single rule.

use core::mem::size_of;

use log::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::block::BlockStore;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{self, Inode, Mode};

/// On-disk directory entry: fixed-width NUL-padded name plus the inum it
/// resolves to. Entries sit packed from offset 0 of the directory's first
/// data block, in insertion order.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub(crate) struct DirEntry {
    pub name: [u8; NAME_LEN],
    pub inum: u32,
}

const _: () = assert!(size_of::<DirEntry>() == DIR_ENTRY_SIZE);

impl DirEntry {
    fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..end]
    }
}

/// Packs `name` into the fixed entry field. Empty names, names over
/// `MAX_NAME_LEN` bytes, and names containing `/` or NUL are invalid.
pub(crate) fn encode_name(name: &str) -> Result<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN || bytes.contains(&b'/') || bytes.contains(&0)
    {
        return Err(FsError::InvalidName);
    }
    let mut field = [0u8; NAME_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

fn entry_at(store: &BlockStore, dir: &Inode, slot: usize) -> DirEntry {
    let off = slot * DIR_ENTRY_SIZE;
    DirEntry::read_from_bytes(&store.block(dir.direct[0])[off..off + DIR_ENTRY_SIZE])
        .expect("entry slice width matches the record")
}

fn write_entry(store: &mut BlockStore, dir: &Inode, slot: usize, entry: &DirEntry) {
    let off = slot * DIR_ENTRY_SIZE;
    store.block_mut(dir.direct[0])[off..off + DIR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
}

fn find_slot(store: &BlockStore, dir: &Inode, field: &[u8; NAME_LEN]) -> Option<(usize, u32)> {
    (0..dir.entry_count as usize).find_map(|slot| {
        let entry = entry_at(store, dir, slot);
        (entry.name == *field).then_some((slot, entry.inum))
    })
}

/// Linear scan for an exact name match among the stored entries.
pub(crate) fn lookup(store: &BlockStore, dir_inum: u32, name: &str) -> Result<u32> {
    let dir = inode::inode(store, dir_inum);
    if !dir.is_dir() {
        return Err(FsError::NotADirectory);
    }
    let field = encode_name(name)?;
    find_slot(store, &dir, &field)
        .map(|(_, inum)| inum)
        .ok_or(FsError::NotFound)
}

/// Appends `name -> inum` at position `entry_count` and bumps the target's
/// link count.
pub(crate) fn put(store: &mut BlockStore, dir_inum: u32, name: &str, inum: u32) -> Result<()> {
    let mut dir = inode::inode(store, dir_inum);
    if !dir.is_dir() {
        return Err(FsError::NotADirectory);
    }
    let field = encode_name(name)?;
    if find_slot(store, &dir, &field).is_some() {
        return Err(FsError::AlreadyExists);
    }
    if dir.entry_count as usize == ENTRIES_PER_BLOCK {
        return Err(FsError::Full);
    }

    let slot = dir.entry_count as usize;
    write_entry(store, &dir, slot, &DirEntry { name: field, inum });
    dir.entry_count += 1;
    dir.size += DIR_ENTRY_SIZE as u32;
    inode::put_inode(store, dir_inum, &dir);

    // dir_inum may equal inum ("." entries), so re-read before bumping.
    let mut target = inode::inode(store, inum);
    target.refs += 1;
    inode::put_inode(store, inum, &target);
    debug!("dir {dir_inum}: put {name:?} -> inode {inum}");
    Ok(())
}

/// Removes `name`, compacts the tail down one slot, and drops the target's
/// link count, reclaiming the target at the end of its lifecycle. Returns
/// the removed entry's inum.
///
/// The mandatory `"."`/`".."` entries cannot be removed by name; they go
/// away only when their directory is reclaimed.
pub(crate) fn delete(store: &mut BlockStore, dir_inum: u32, name: &str) -> Result<u32> {
    if name == "." || name == ".." {
        return Err(FsError::InvalidName);
    }
    let dir = inode::inode(store, dir_inum);
    if !dir.is_dir() {
        return Err(FsError::NotADirectory);
    }
    let field = encode_name(name)?;
    let (slot, target) = find_slot(store, &dir, &field).ok_or(FsError::NotFound)?;
    remove_slot(store, dir_inum, slot);
    debug!("dir {dir_inum}: delete {name:?} (inode {target})");
    unlink_ref(store, target);
    Ok(target)
}

/// Shifts the entries after `slot` down one place so the array stays packed
/// in insertion order, and shrinks the directory's counts.
fn remove_slot(store: &mut BlockStore, dir_inum: u32, slot: usize) {
    let mut dir = inode::inode(store, dir_inum);
    let count = dir.entry_count as usize;
    let block = store.block_mut(dir.direct[0]);
    block.copy_within((slot + 1) * DIR_ENTRY_SIZE..count * DIR_ENTRY_SIZE, slot * DIR_ENTRY_SIZE);
    dir.entry_count -= 1;
    dir.size -= DIR_ENTRY_SIZE as u32;
    inode::put_inode(store, dir_inum, &dir);
}

/// Drops one reference and reclaims the inode if that was the last.
fn unlink_ref(store: &mut BlockStore, inum: u32) {
    let mut target = inode::inode(store, inum);
    target.refs -= 1;
    inode::put_inode(store, inum, &target);
    reclaim(store, inum);
}

/// An inode is destroyed exactly when `refs == 0` and `entry_count == 0`.
/// A directory reduced to its own `"."` reference with only the two
/// mandatory entries left is purged first: its `".."` stops counting
/// toward the parent and its `"."` toward itself, which brings it to the
/// threshold.
fn reclaim(store: &mut BlockStore, inum: u32) {
    let ino = inode::inode(store, inum);
    if ino.refs == 0 && ino.entry_count == 0 {
        inode::free_inode(store, inum);
        return;
    }
    if ino.is_dir() && ino.refs == 1 && ino.entry_count == 2 {
        let mut parent = None;
        for slot in 0..2 {
            let entry = entry_at(store, &ino, slot);
            if entry.inum != inum {
                parent = Some(entry.inum);
            }
        }
        let mut ino = ino;
        ino.entry_count = 0;
        ino.size = 0;
        ino.refs -= 1; // its own "." entry
        inode::put_inode(store, inum, &ino);
        inode::free_inode(store, inum);
        if let Some(parent) = parent {
            unlink_ref(store, parent);
        }
    }
}

/// Repoints a directory's `".."` entry at `new_parent`, moving the
/// reference it carries from the old parent to the new one.
pub(crate) fn reparent(store: &mut BlockStore, dir_inum: u32, new_parent: u32) {
    let dir = inode::inode(store, dir_inum);
    let field = encode_name("..").expect("literal name");
    let Some((slot, old_parent)) = find_slot(store, &dir, &field) else {
        return;
    };
    if old_parent == new_parent {
        return;
    }
    write_entry(store, &dir, slot, &DirEntry { name: field, inum: new_parent });
    let mut target = inode::inode(store, new_parent);
    target.refs += 1;
    inode::put_inode(store, new_parent, &target);
    unlink_ref(store, old_parent);
}

/// Snapshot of the stored names in storage order. Nothing is synthesized;
/// `"."` and `".."` appear because they are literally stored.
pub(crate) fn list(store: &BlockStore, dir_inum: u32) -> Result<Vec<String>> {
    let dir = inode::inode(store, dir_inum);
    if !dir.is_dir() {
        return Err(FsError::NotADirectory);
    }
    Ok((0..dir.entry_count as usize)
        .map(|slot| {
            let entry = entry_at(store, &dir, slot);
            String::from_utf8_lossy(entry.name_bytes()).into_owned()
        })
        .collect())
}

/// Creates the root directory: the first inode ever allocated (so inum 0),
/// a directory holding a single `"."` self-entry.
pub(crate) fn init_root(store: &mut BlockStore) -> Result<()> {
    let inum = inode::alloc_inode(store)?;
    assert_eq!(inum, ROOT_INUM, "root must be the first inode");
    let mut root = inode::inode(store, inum);
    root.mode = Mode::dir_default().bits();
    inode::put_inode(store, inum, &root);
    put(store, inum, ".", inum)
}
