//! Inode records and the block chain that backs file content.

use core::mem::size_of;

use log::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::block::BlockStore;
use crate::config::*;
use crate::error::{FsError, Result};

bitflags::bitflags! {
    /// Type and permission bits, classic octal layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        const REGULAR = 0o100000;
        const DIRECTORY = 0o040000;
        const USER_R = 0o400;
        const USER_W = 0o200;
        const USER_X = 0o100;
        const GROUP_R = 0o040;
        const GROUP_W = 0o020;
        const GROUP_X = 0o010;
        const OTHER_R = 0o004;
        const OTHER_W = 0o002;
        const OTHER_X = 0o001;

        const TYPE_MASK = Self::REGULAR.bits() | Self::DIRECTORY.bits();
    }
}

impl Mode {
    pub fn is_dir(self) -> bool {
        self.contains(Mode::DIRECTORY)
    }

    pub fn is_regular(self) -> bool {
        self.contains(Mode::REGULAR)
    }

    /// 0o644 regular file.
    pub fn file_default() -> Self {
        Mode::REGULAR | Mode::USER_R | Mode::USER_W | Mode::GROUP_R | Mode::OTHER_R
    }

    /// 0o755 directory.
    pub fn dir_default() -> Self {
        Mode::DIRECTORY
            | Mode::USER_R
            | Mode::USER_W
            | Mode::USER_X
            | Mode::GROUP_R
            | Mode::GROUP_X
            | Mode::OTHER_R
            | Mode::OTHER_X
    }
}

/// On-disk inode record. The table is a packed array of these spanning the
/// reserved table blocks; a record's index in the table is its inum.
///
/// Block number 0 is reserved for the bitmaps, so 0 doubles as the
/// "unassigned" sentinel in `direct` and `indirect`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Inode {
    /// Number of directory entries anywhere that store this inum.
    pub refs: u32,
    /// Type and permission bits.
    pub mode: u32,
    /// Bytes used.
    pub size: u32,
    /// The first two block-sized regions of content.
    pub direct: [u32; NUM_DIRECT],
    /// Block whose contents are further block numbers, indexed by
    /// `block_index - NUM_DIRECT`.
    pub indirect: u32,
    /// Directory entries held; 0 for regular files.
    pub entry_count: u32,
}

const _: () = assert!(size_of::<Inode>() == INODE_SIZE);

impl Inode {
    pub fn is_dir(&self) -> bool {
        Mode::from_bits_retain(self.mode).is_dir()
    }
}

/// Copies the record for `inum` out of the table. An inum beyond the table
/// is a contract violation.
pub(crate) fn inode(store: &BlockStore, inum: u32) -> Inode {
    assert!((inum as usize) < NUM_INODES, "inum {inum} out of range");
    let off = inum as usize * INODE_SIZE;
    Inode::read_from_bytes(&store.inode_table()[off..off + INODE_SIZE])
        .expect("inode slice width matches the record")
}

/// Writes the record for `inum` back into the table.
pub(crate) fn put_inode(store: &mut BlockStore, inum: u32, ino: &Inode) {
    assert!((inum as usize) < NUM_INODES, "inum {inum} out of range");
    let off = inum as usize * INODE_SIZE;
    store.inode_table_mut()[off..off + INODE_SIZE].copy_from_slice(ino.as_bytes());
}

/// First-fit scan of the inode bitmap. The new record is zeroed and given
/// one seed data block in `direct[0]`.
pub(crate) fn alloc_inode(store: &mut BlockStore) -> Result<u32> {
    for inum in 0..NUM_INODES as u32 {
        if store.inode_used(inum) {
            continue;
        }
        store.set_inode_bit(inum, true);
        let seed = match store.alloc_block() {
            Ok(bnum) => bnum,
            Err(e) => {
                store.set_inode_bit(inum, false);
                return Err(e);
            }
        };
        // Freed blocks keep their old contents, so the seed must be
        // cleared before a directory reads entries from it.
        store.block_mut(seed).fill(0);
        let mut ino = Inode::default();
        ino.direct[0] = seed;
        put_inode(store, inum, &ino);
        debug!("alloc inode {inum}, seed block {seed}");
        return Ok(inum);
    }
    Err(FsError::OutOfSpace)
}

/// Releases every block reachable from the inode, zeroes the record, and
/// clears the bitmap bit. The caller must have run the record down to
/// `refs == 0` and `entry_count == 0`.
pub(crate) fn free_inode(store: &mut BlockStore, inum: u32) {
    let ino = inode(store, inum);
    assert!(
        ino.refs == 0 && ino.entry_count == 0,
        "freeing live inode {inum}"
    );
    for bnum in ino.direct.into_iter().filter(|&b| b != 0) {
        store.free_block(bnum);
    }
    if ino.indirect != 0 {
        for slot in 0..PTRS_PER_BLOCK {
            let bnum = read_ptr(store.block(ino.indirect), slot);
            if bnum != 0 {
                store.free_block(bnum);
            }
        }
        store.free_block(ino.indirect);
    }
    put_inode(store, inum, &Inode::default());
    store.set_inode_bit(inum, false);
    debug!("free inode {inum}");
}

fn read_ptr(block: &[u8], slot: usize) -> u32 {
    let off = slot * size_of::<u32>();
    u32::from_le_bytes(block[off..off + 4].try_into().expect("4-byte slot"))
}

fn write_ptr(block: &mut [u8], slot: usize, bnum: u32) {
    let off = slot * size_of::<u32>();
    block[off..off + 4].copy_from_slice(&bnum.to_le_bytes());
}

/// Blocks needed to cover `size` bytes. The seed block never goes away, so
/// the chain is at least one block long.
fn chain_len(size: u32) -> usize {
    (size as usize).div_ceil(BLOCK_SIZE).max(1)
}

/// The block number covering chain index `index`.
fn block_at(store: &BlockStore, ino: &Inode, index: usize) -> u32 {
    let bnum = if index < NUM_DIRECT {
        ino.direct[index]
    } else {
        assert!(ino.indirect != 0, "no indirect block for index {index}");
        read_ptr(store.block(ino.indirect), index - NUM_DIRECT)
    };
    assert!(bnum != 0, "unassigned block at chain index {index}");
    bnum
}

/// The block number covering byte `offset`, which must lie within the
/// allocated chain.
pub(crate) fn resolve_block(store: &BlockStore, ino: &Inode, offset: u32) -> u32 {
    block_at(store, ino, offset as usize / BLOCK_SIZE)
}

/// Extends the block chain so the inode covers `new_size` bytes. Newly
/// exposed bytes read back as zero: fresh blocks are cleared on allocation
/// and the stale tail of the old last block is cleared here.
///
/// On allocation failure the chain built so far is kept on the record (with
/// `size` advanced to what it covers) so no block leaks.
pub(crate) fn grow(store: &mut BlockStore, inum: u32, new_size: u32) -> Result<()> {
    if new_size > MAX_FILE_SIZE {
        return Err(FsError::OutOfRange);
    }
    let mut ino = inode(store, inum);
    let old_size = ino.size;
    if new_size <= old_size {
        return Ok(());
    }

    let have = chain_len(old_size);
    let need = chain_len(new_size);

    // The old last block may hold stale bytes from before a shrink. Clear
    // them before extending; the failure arm below advances `size` past
    // them, so they must already read zero by then.
    let tail_end = ((have * BLOCK_SIZE) as u32).min(new_size);
    if old_size < tail_end {
        let bnum = block_at(store, &ino, have - 1);
        let base = ((have - 1) * BLOCK_SIZE) as u32;
        let from = (old_size - base) as usize;
        let to = (tail_end - base) as usize;
        store.block_mut(bnum)[from..to].fill(0);
    }

    for index in have..need {
        match extend_one(store, &mut ino, index) {
            Ok(()) => {}
            Err(e) => {
                ino.size = old_size.max((index * BLOCK_SIZE) as u32);
                put_inode(store, inum, &ino);
                return Err(e);
            }
        }
    }

    ino.size = new_size;
    put_inode(store, inum, &ino);
    Ok(())
}

/// Allocates and clears the block for chain index `index`, wiring in the
/// indirect block first when the index calls for one.
fn extend_one(store: &mut BlockStore, ino: &mut Inode, index: usize) -> Result<()> {
    if index >= NUM_DIRECT && ino.indirect == 0 {
        let ind = store.alloc_block()?;
        store.block_mut(ind).fill(0);
        ino.indirect = ind;
    }
    let bnum = store.alloc_block()?;
    store.block_mut(bnum).fill(0);
    if index < NUM_DIRECT {
        ino.direct[index] = bnum;
    } else {
        let ind = ino.indirect;
        write_ptr(store.block_mut(ind), index - NUM_DIRECT, bnum);
    }
    Ok(())
}

/// Releases blocks from the highest chain index down to what `new_size`
/// requires, dropping the indirect block once no indirect-indexed block
/// remains. The seed block in `direct[0]` stays even at size 0.
pub(crate) fn shrink(store: &mut BlockStore, inum: u32, new_size: u32) {
    let mut ino = inode(store, inum);
    if new_size >= ino.size {
        ino.size = new_size;
        put_inode(store, inum, &ino);
        return;
    }

    let keep = chain_len(new_size);
    let have = chain_len(ino.size);
    for index in (keep..have).rev() {
        let bnum = block_at(store, &ino, index);
        if index < NUM_DIRECT {
            ino.direct[index] = 0;
        } else {
            let ind = ino.indirect;
            write_ptr(store.block_mut(ind), index - NUM_DIRECT, 0);
        }
        store.free_block(bnum);
    }
    if keep <= NUM_DIRECT && ino.indirect != 0 {
        store.free_block(ino.indirect);
        ino.indirect = 0;
    }
    ino.size = new_size;
    put_inode(store, inum, &ino);
}
