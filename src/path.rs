//! Absolute path resolution.
//!
//! Paths are walked one component at a time against the stored directory
//! entries, so `"."` and `".."` need no special handling here: they resolve
//! like any other name because they are literally stored.

use log::trace;

use crate::block::BlockStore;
use crate::config::ROOT_INUM;
use crate::directory;
use crate::error::{FsError, Result};

fn components(path: &str) -> Result<impl Iterator<Item = &str>> {
    let rest = path.strip_prefix('/').ok_or(FsError::InvalidName)?;
    Ok(rest.split('/').filter(|c| !c.is_empty()))
}

/// Resolves an absolute path to an inum, starting at the root.
pub(crate) fn resolve(store: &BlockStore, path: &str) -> Result<u32> {
    let mut inum = ROOT_INUM;
    for name in components(path)? {
        inum = directory::lookup(store, inum, name)?;
    }
    trace!("resolve {path:?} -> inode {inum}");
    Ok(inum)
}

/// Splits a path into its resolved parent directory and the final
/// component. The leaf itself need not exist; everything before it must.
/// The root has no parent, so `"/"` (or an equivalent spelling) is invalid
/// here.
pub(crate) fn resolve_parent<'p>(store: &BlockStore, path: &'p str) -> Result<(u32, &'p str)> {
    let mut walked: Vec<&str> = components(path)?.collect();
    let leaf = walked.pop().ok_or(FsError::InvalidName)?;
    let mut inum = ROOT_INUM;
    for name in walked {
        inum = directory::lookup(store, inum, name)?;
    }
    Ok((inum, leaf))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::{self, Mode};

    fn fixture() -> BlockStore {
        let mut store = BlockStore::new_in_memory();
        store.reserve_system_blocks();
        directory::init_root(&mut store).unwrap();
        store
    }

    fn mkdir_under(store: &mut BlockStore, parent: u32, name: &str) -> u32 {
        let inum = inode::alloc_inode(store).unwrap();
        let mut ino = inode::inode(store, inum);
        ino.mode = Mode::dir_default().bits();
        inode::put_inode(store, inum, &ino);
        directory::put(store, parent, name, inum).unwrap();
        directory::put(store, inum, ".", inum).unwrap();
        directory::put(store, inum, "..", parent).unwrap();
        inum
    }

    #[test]
    fn root_resolves_to_inode_zero() {
        let store = fixture();
        assert_eq!(resolve(&store, "/").unwrap(), ROOT_INUM);
    }

    #[test]
    fn nested_walk_and_dot_dot() {
        let mut store = fixture();
        let a = mkdir_under(&mut store, ROOT_INUM, "a");
        let b = mkdir_under(&mut store, a, "b");
        assert_eq!(resolve(&store, "/a/b").unwrap(), b);
        assert_eq!(resolve(&store, "/a/b/.").unwrap(), b);
        assert_eq!(resolve(&store, "/a/b/..").unwrap(), a);
        assert_eq!(resolve(&store, "/a/b/../..").unwrap(), ROOT_INUM);
    }

    #[test]
    fn repeated_slashes_collapse() {
        let mut store = fixture();
        let a = mkdir_under(&mut store, ROOT_INUM, "a");
        assert_eq!(resolve(&store, "//a//").unwrap(), a);
    }

    #[test]
    fn relative_paths_are_rejected() {
        let store = fixture();
        assert!(matches!(resolve(&store, "a"), Err(FsError::InvalidName)));
        assert!(matches!(resolve(&store, ""), Err(FsError::InvalidName)));
    }

    #[test]
    fn missing_component_is_not_found() {
        let store = fixture();
        assert!(matches!(
            resolve(&store, "/nope"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn parent_split_points_at_the_directory() {
        let mut store = fixture();
        let a = mkdir_under(&mut store, ROOT_INUM, "a");
        let (parent, leaf) = resolve_parent(&store, "/a/newfile").unwrap();
        assert_eq!(parent, a);
        assert_eq!(leaf, "newfile");
        assert!(matches!(
            resolve_parent(&store, "/"),
            Err(FsError::InvalidName)
        ));
    }
}
