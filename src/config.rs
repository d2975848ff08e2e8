//! Fixed geometry of the filesystem image.

use core::mem::size_of;

/// Size of one block in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Total number of blocks in the backing image (1 MiB).
pub const NUM_BLOCKS: usize = 256;
/// Number of slots in the inode table.
pub const NUM_INODES: usize = 256;

/// Inode number of the root directory, the first inode ever allocated.
pub const ROOT_INUM: u32 = 0;

// Block 0 holds the two allocation bitmaps back to back.
pub(crate) const BLOCK_BITMAP_OFFSET: usize = 0;
pub(crate) const INODE_BITMAP_OFFSET: usize = NUM_BLOCKS / 8;

/// On-disk width of one inode record.
pub(crate) const INODE_SIZE: usize = 28;

/// First block of the inode table.
pub(crate) const INODE_TABLE_START: usize = 1;
/// Blocks reserved for the inode table.
pub(crate) const INODE_TABLE_BLOCKS: usize =
    (NUM_INODES * INODE_SIZE + BLOCK_SIZE - 1) / BLOCK_SIZE;
/// First data block; everything below it is reserved.
pub const DATA_START: usize = INODE_TABLE_START + INODE_TABLE_BLOCKS;

/// Direct block pointers per inode.
pub const NUM_DIRECT: usize = 2;
/// Block numbers held by one indirect block (4 bytes per number on disk).
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();
/// Hard ceiling on file size: two direct blocks plus a full indirect block.
pub const MAX_FILE_SIZE: u32 = ((NUM_DIRECT + PTRS_PER_BLOCK) * BLOCK_SIZE) as u32;

/// Fixed width of the directory entry name field, NUL-padded.
pub(crate) const NAME_LEN: usize = 48;
/// Usable name length; the final byte stays NUL.
pub const MAX_NAME_LEN: usize = NAME_LEN - 1;
/// On-disk width of a directory entry (name plus inum).
pub(crate) const DIR_ENTRY_SIZE: usize = NAME_LEN + size_of::<u32>();
/// A directory never spans more than its first data block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;
