use thiserror::Error;

/// Errors returned to callers of the engine.
///
/// Out-of-bounds block or inode indices are programmer errors, not user
/// errors, and panic in the store layer instead of appearing here.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory has no free entry slot")]
    Full,
    #[error("no free blocks or inodes left")]
    OutOfSpace,
    #[error("offset or size beyond the maximum file size")]
    OutOfRange,
    #[error("invalid file name")]
    InvalidName,
    #[error("backing image i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, FsError>;
