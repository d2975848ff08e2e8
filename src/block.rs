//! Raw block access and block allocation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::config::*;
use crate::error::{FsError, Result};

/// Fixed-capacity block store: one contiguous region of
/// `NUM_BLOCKS * BLOCK_SIZE` bytes, optionally backed by an image file.
///
/// Block 0 holds the block and inode allocation bitmaps; the inode table
/// occupies the next reserved blocks; everything from `DATA_START` up is
/// data. Each store is an independent instance, so tests can run many
/// filesystems side by side.
pub struct BlockStore {
    region: Box<[u8]>,
    backing: Option<File>,
}

impl BlockStore {
    /// Opens (or creates) the backing image at `path` and loads it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len((NUM_BLOCKS * BLOCK_SIZE) as u64)?;
        let mut region = vec![0u8; NUM_BLOCKS * BLOCK_SIZE].into_boxed_slice();
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut region)?;
        Ok(Self {
            region,
            backing: Some(file),
        })
    }

    /// A zeroed store with no backing file.
    pub fn new_in_memory() -> Self {
        Self {
            region: vec![0u8; NUM_BLOCKS * BLOCK_SIZE].into_boxed_slice(),
            backing: None,
        }
    }

    /// Writes the region back to the backing file, if there is one.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = &mut self.backing {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&self.region)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Whether the image already carries a formatted filesystem. Reserved
    /// blocks are marked used at format time, so bit 0 doubles as the flag.
    pub(crate) fn formatted(&self) -> bool {
        self.block_used(0)
    }

    /// Marks the bitmap and inode-table blocks as allocated.
    pub(crate) fn reserve_system_blocks(&mut self) {
        for bnum in 0..DATA_START as u32 {
            self.set_block_bit(bnum, true);
        }
    }

    /// Read view of block `bnum`. Out-of-range is a contract violation.
    pub(crate) fn block(&self, bnum: u32) -> &[u8] {
        assert!((bnum as usize) < NUM_BLOCKS, "block {bnum} out of range");
        let start = bnum as usize * BLOCK_SIZE;
        &self.region[start..start + BLOCK_SIZE]
    }

    /// Write view of block `bnum`.
    pub(crate) fn block_mut(&mut self, bnum: u32) -> &mut [u8] {
        assert!((bnum as usize) < NUM_BLOCKS, "block {bnum} out of range");
        let start = bnum as usize * BLOCK_SIZE;
        &mut self.region[start..start + BLOCK_SIZE]
    }

    /// Contiguous view of the reserved inode-table blocks.
    pub(crate) fn inode_table(&self) -> &[u8] {
        &self.region[INODE_TABLE_START * BLOCK_SIZE..DATA_START * BLOCK_SIZE]
    }

    pub(crate) fn inode_table_mut(&mut self) -> &mut [u8] {
        &mut self.region[INODE_TABLE_START * BLOCK_SIZE..DATA_START * BLOCK_SIZE]
    }

    fn bit(&self, base: usize, index: u32) -> bool {
        self.region[base + (index / 8) as usize] & (1 << (index % 8)) != 0
    }

    fn set_bit(&mut self, base: usize, index: u32, used: bool) {
        let byte = &mut self.region[base + (index / 8) as usize];
        if used {
            *byte |= 1 << (index % 8);
        } else {
            *byte &= !(1 << (index % 8));
        }
    }

    pub(crate) fn block_used(&self, bnum: u32) -> bool {
        assert!((bnum as usize) < NUM_BLOCKS, "block {bnum} out of range");
        self.bit(BLOCK_BITMAP_OFFSET, bnum)
    }

    fn set_block_bit(&mut self, bnum: u32, used: bool) {
        assert!((bnum as usize) < NUM_BLOCKS, "block {bnum} out of range");
        self.set_bit(BLOCK_BITMAP_OFFSET, bnum, used);
    }

    pub(crate) fn inode_used(&self, inum: u32) -> bool {
        assert!((inum as usize) < NUM_INODES, "inum {inum} out of range");
        self.bit(INODE_BITMAP_OFFSET, inum)
    }

    pub(crate) fn set_inode_bit(&mut self, inum: u32, used: bool) {
        assert!((inum as usize) < NUM_INODES, "inum {inum} out of range");
        self.set_bit(INODE_BITMAP_OFFSET, inum, used);
    }

    /// First-fit scan of the block bitmap. Capacity is small and fixed, so
    /// a linear scan is adequate; no free list.
    pub(crate) fn alloc_block(&mut self) -> Result<u32> {
        for bnum in 0..NUM_BLOCKS as u32 {
            if !self.block_used(bnum) {
                self.set_block_bit(bnum, true);
                debug!("alloc block {bnum}");
                return Ok(bnum);
            }
        }
        Err(FsError::OutOfSpace)
    }

    /// Clears the allocation bit. Contents are left as-is; the block must
    /// not be read again until a fresh allocation rewrites it.
    pub(crate) fn free_block(&mut self, bnum: u32) {
        assert!(
            (DATA_START as u32..NUM_BLOCKS as u32).contains(&bnum),
            "freeing reserved or out-of-range block {bnum}"
        );
        debug!("free block {bnum}");
        self.set_block_bit(bnum, false);
    }

    /// Number of set bits in the block bitmap (reserved blocks included).
    pub fn used_blocks(&self) -> usize {
        (0..NUM_BLOCKS as u32).filter(|&b| self.block_used(b)).count()
    }

    /// Number of set bits in the inode bitmap.
    pub fn used_inodes(&self) -> usize {
        (0..NUM_INODES as u32).filter(|&i| self.inode_used(i)).count()
    }
}
