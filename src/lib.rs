//! A small block filesystem over a fixed-size image.
//!
//! The image is an array of 4096-byte blocks: block 0 holds the block and
//! inode bitmaps, the next blocks hold the inode table, and everything
//! after that is data. Files address their blocks through two direct slots
//! and one single-indirect block; directories pack fixed-width entries into
//! their first data block and store `"."` and `".."` like any other entry.
//!
//! Layout:
//! - `config` -- the on-disk geometry constants
//! - `error`  -- the crate error type
//! - `block`  -- the backing store, bitmaps, and block allocation
//! - `inode`  -- inode records and the block chain (grow/shrink/resolve)
//! - `directory` -- entries, linking, and reference-counted reclamation
//! - `path`   -- absolute path resolution
//! - `fs`     -- the public [`FileSystem`] facade

mod block;
mod directory;
mod inode;
mod path;

pub mod config;
pub mod error;
pub mod fs;

pub use error::{FsError, Result};
pub use fs::{FileSystem, Stat};
pub use inode::Mode;
