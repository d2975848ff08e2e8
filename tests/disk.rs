use quark::config::{BLOCK_SIZE, NUM_BLOCKS};
use quark::{FileSystem, FsError, Mode};

#[test]
fn image_survives_a_remount() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("quark.img");

    {
        let mut fs = FileSystem::open(&image).unwrap();
        fs.mkdir("/etc", Mode::dir_default()).unwrap();
        fs.mknod("/etc/motd", Mode::file_default()).unwrap();
        fs.write("/etc/motd", 0, b"welcome back").unwrap();
        fs.flush().unwrap();
    }

    let fs = FileSystem::open(&image).unwrap();
    let size = fs.stat("/etc/motd").unwrap().size as usize;
    let mut buf = vec![0u8; size];
    fs.read("/etc/motd", 0, &mut buf).unwrap();
    assert_eq!(buf, b"welcome back");
}

#[test]
fn reopening_does_not_reformat() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("quark.img");

    {
        let mut fs = FileSystem::open(&image).unwrap();
        fs.mknod("/keep", Mode::file_default()).unwrap();
        fs.flush().unwrap();
    }
    {
        // Open without writing anything; the existing contents must not be
        // wiped by a second format.
        let mut fs = FileSystem::open(&image).unwrap();
        assert!(fs.stat("/keep").is_ok());
        fs.mknod("/more", Mode::file_default()).unwrap();
        fs.flush().unwrap();
    }

    let fs = FileSystem::open(&image).unwrap();
    assert!(fs.stat("/keep").is_ok());
    assert!(fs.stat("/more").is_ok());
}

#[test]
fn unflushed_changes_are_lost() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("quark.img");

    {
        let mut fs = FileSystem::open(&image).unwrap();
        fs.flush().unwrap();
        fs.mknod("/ghost", Mode::file_default()).unwrap();
        // dropped without flush
    }

    let fs = FileSystem::open(&image).unwrap();
    assert!(matches!(fs.stat("/ghost"), Err(FsError::NotFound)));
}

#[test]
fn the_image_has_a_fixed_footprint() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("quark.img");

    let mut fs = FileSystem::open(&image).unwrap();
    fs.mknod("/f", Mode::file_default()).unwrap();
    fs.write("/f", 0, &vec![7u8; 64 * 1024]).unwrap();
    fs.flush().unwrap();

    let len = std::fs::metadata(&image).unwrap().len();
    assert_eq!(len, (NUM_BLOCKS * BLOCK_SIZE) as u64);
}
