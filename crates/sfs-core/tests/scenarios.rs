//! End-to-end walks through the canonical usage scenarios.

use sfs_core::{Filesystem, FsOptions, OpenFlags, SfsError, Whence};

fn small_fs() -> Filesystem {
    Filesystem::initialize(8 << 20, FsOptions::default()).expect("format")
}

#[test]
fn create_write_read_back() {
    let fs = small_fs();

    fs.mkdir("/etc", 0o755).unwrap();
    let fd = fs
        .open("/etc/hostname", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    assert!(fd >= 3);
    assert_eq!(fs.write(fd, b"hello\n").unwrap(), 6);
    fs.close(fd).unwrap();

    let st = fs.stat("/etc/hostname").unwrap();
    assert_eq!(st.size, 6);
    assert_eq!(st.perm(), 0o644);
    assert!(st.is_file());

    let fd = fs.open("/etc/hostname", OpenFlags::RDONLY, 0).unwrap();
    let mut buf = [0_u8; 16];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"hello\n");
    // A second read sits at end-of-file.
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
    fs.close(fd).unwrap();
}

#[test]
fn symlink_follow_and_lresolve() {
    let fs = small_fs();
    fs.mkdir("/etc", 0o755).unwrap();
    let fd = fs
        .open("/etc/hostname", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    fs.write(fd, b"hello\n").unwrap();
    fs.close(fd).unwrap();

    fs.symlink("/etc/hostname", "/hn").unwrap();

    assert_eq!(fs.stat("/hn").unwrap().size, 6);
    assert!(fs.lstat("/hn").unwrap().is_symlink());
    assert_eq!(fs.readlink("/hn").unwrap(), "/etc/hostname");

    // Opening the link itself is refused.
    let err = fs
        .open("/hn", OpenFlags::NOFOLLOW | OpenFlags::RDONLY, 0)
        .unwrap_err();
    assert!(matches!(err, SfsError::Invalid(_)));

    // Following it opens the target.
    let fd = fs.open("/hn", OpenFlags::RDONLY, 0).unwrap();
    let mut buf = [0_u8; 8];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    fs.close(fd).unwrap();
}

#[test]
fn sparse_hole_reads_zeroes() {
    let fs = small_fs();

    let fd = fs
        .open("/sparse", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    assert_eq!(fs.lseek(fd, 10 * 4096, Whence::Set).unwrap(), 40_960);
    assert_eq!(fs.write(fd, b"x").unwrap(), 1);
    fs.close(fd).unwrap();

    let st = fs.stat("/sparse").unwrap();
    assert_eq!(st.size, 40_961);
    assert_eq!(st.blocks, 1, "only the trailing block is allocated");

    let fd = fs.open("/sparse", OpenFlags::RDONLY, 0).unwrap();
    let mut buf = vec![0xAA_u8; 4096];
    assert_eq!(fs.pread(fd, &mut buf, 0).unwrap(), 4096);
    assert!(buf.iter().all(|b| *b == 0));
    fs.close(fd).unwrap();
}

#[test]
fn rename_shadows_the_destination() {
    let fs = small_fs();
    for path in ["/a", "/b"] {
        let fd = fs
            .open(path, OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
            .unwrap();
        fs.close(fd).unwrap();
    }
    let a_ino = fs.stat("/a").unwrap().ino;

    fs.rename("/a", "/b").unwrap();

    assert!(matches!(fs.stat("/a").unwrap_err(), SfsError::NotFound(_)));
    let st = fs.stat("/b").unwrap();
    assert_eq!(st.ino, a_ino);
    assert!(fs.check().unwrap().is_clean(), "replaced inode fully released");
}

#[test]
fn capacity_exhaustion_and_recovery() {
    let fs = Filesystem::initialize(1 << 20, FsOptions::default()).expect("format");

    // A file with a known footprint: 10 data blocks + 1 pointer block.
    let fd = fs
        .open("/victim", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    let ten_blocks = vec![0x55_u8; 10 * 4096];
    assert_eq!(fs.write(fd, &ten_blocks).unwrap(), ten_blocks.len());
    fs.close(fd).unwrap();
    assert_eq!(fs.stat("/victim").unwrap().blocks, 10);

    // Fill the rest until the filesystem reports no space.
    let fd = fs
        .open("/filler", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    let chunk = vec![0x66_u8; 64 * 4096];
    loop {
        match fs.write(fd, &chunk) {
            Ok(n) if n == chunk.len() => {}
            Ok(_) => {} // short count: the final blocks went in
            Err(SfsError::NoSpace) => break,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    fs.close(fd).unwrap();
    assert_eq!(fs.statfs().unwrap().free_blocks, 0);

    // Releasing the victim returns its data and pointer blocks exactly.
    fs.unlink("/victim").unwrap();
    assert_eq!(fs.statfs().unwrap().free_blocks, 11);
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn truncate_on_open_returns_blocks() {
    let fs = small_fs();
    let before = fs.statfs().unwrap().free_blocks;

    let fd = fs
        .open("/log", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    fs.write(fd, &vec![1_u8; 12 * 4096]).unwrap();
    fs.close(fd).unwrap();
    assert!(fs.statfs().unwrap().free_blocks < before);

    let fd = fs
        .open("/log", OpenFlags::WRONLY | OpenFlags::TRUNC, 0)
        .unwrap();
    fs.close(fd).unwrap();

    assert_eq!(fs.stat("/log").unwrap().size, 0);
    assert_eq!(fs.stat("/log").unwrap().blocks, 0);
    assert_eq!(fs.statfs().unwrap().free_blocks, before);
}

#[test]
fn append_positions_at_end_each_write() {
    let fs = small_fs();
    let fd = fs
        .open("/notes", OpenFlags::CREAT | OpenFlags::WRONLY, 0o600)
        .unwrap();
    fs.write(fd, b"one").unwrap();
    fs.close(fd).unwrap();

    let fd = fs
        .open("/notes", OpenFlags::WRONLY | OpenFlags::APPEND, 0)
        .unwrap();
    fs.write(fd, b"-two").unwrap();
    // Seeking back does not defeat append mode.
    fs.lseek(fd, 0, Whence::Set).unwrap();
    fs.write(fd, b"-three").unwrap();
    fs.close(fd).unwrap();

    let fd = fs.open("/notes", OpenFlags::RDONLY, 0).unwrap();
    let mut buf = [0_u8; 32];
    let n = fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"one-two-three");
    fs.close(fd).unwrap();
}

#[test]
fn readdir_lists_in_slot_order() {
    let fs = small_fs();
    fs.mkdir("/srv", 0o755).unwrap();
    for name in ["zeta", "alpha", "mid"] {
        let fd = fs
            .open(&format!("/srv/{name}"), OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
            .unwrap();
        fs.close(fd).unwrap();
    }
    fs.mkdir("/srv/sub", 0o700).unwrap();

    let names: Vec<String> = fs
        .readdir("/srv")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["zeta", "alpha", "mid", "sub"]);

    let entries = fs.readdir("/srv").unwrap();
    assert_eq!(entries[3].d_type, sfs_types::DT_DIR);
    assert_eq!(entries[0].d_type, sfs_types::DT_REG);
}

#[test]
fn mkdir_tracks_parent_links() {
    let fs = small_fs();
    assert_eq!(fs.stat("/").unwrap().nlink, 2);

    fs.mkdir("/a", 0o755).unwrap();
    fs.mkdir("/b", 0o755).unwrap();
    assert_eq!(fs.stat("/").unwrap().nlink, 4);
    assert_eq!(fs.stat("/a").unwrap().nlink, 2);

    fs.rmdir("/b").unwrap();
    assert_eq!(fs.stat("/").unwrap().nlink, 3);
}

#[test]
fn rmdir_refuses_nonempty_and_root() {
    let fs = small_fs();
    fs.mkdir("/data", 0o755).unwrap();
    let fd = fs
        .open("/data/file", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    fs.close(fd).unwrap();

    assert_eq!(fs.rmdir("/data").unwrap_err(), SfsError::NotEmpty);
    assert!(matches!(fs.rmdir("/").unwrap_err(), SfsError::Invalid(_)));

    fs.unlink("/data/file").unwrap();
    fs.rmdir("/data").unwrap();
    assert!(matches!(fs.stat("/data").unwrap_err(), SfsError::NotFound(_)));
}

#[test]
fn hard_links_share_the_inode() {
    let fs = small_fs();
    let fd = fs
        .open("/original", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    fs.write(fd, b"shared").unwrap();
    fs.close(fd).unwrap();

    fs.link("/original", "/alias").unwrap();
    let a = fs.stat("/original").unwrap();
    let b = fs.stat("/alias").unwrap();
    assert_eq!(a.ino, b.ino);
    assert_eq!(a.nlink, 2);

    // Content stays until the last name goes.
    fs.unlink("/original").unwrap();
    assert_eq!(fs.stat("/alias").unwrap().nlink, 1);
    let fd = fs.open("/alias", OpenFlags::RDONLY, 0).unwrap();
    let mut buf = [0_u8; 8];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    fs.close(fd).unwrap();

    fs.unlink("/alias").unwrap();
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn chmod_chown_utimes() {
    let fs = small_fs();
    let fd = fs
        .open("/cfg", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    fs.close(fd).unwrap();

    fs.chmod("/cfg", 0o600).unwrap();
    let st = fs.stat("/cfg").unwrap();
    assert_eq!(st.perm(), 0o600);
    assert!(st.is_file(), "chmod keeps the type bits");

    fs.chown("/cfg", 1000, sfs_core::NO_CHANGE).unwrap();
    let st = fs.stat("/cfg").unwrap();
    assert_eq!((st.uid, st.gid), (1000, 0));

    fs.utimes("/cfg", 111, 222).unwrap();
    let st = fs.stat("/cfg").unwrap();
    assert_eq!((st.atime, st.mtime), (111, 222));
}

#[test]
fn attach_validates_magic() {
    let fs = small_fs();
    let buffer = fs.buffer();
    assert!(Filesystem::looks_formatted(&buffer));

    // A second context sees the same namespace.
    fs.mkdir("/shared", 0o755).unwrap();
    let other = Filesystem::attach(buffer).unwrap();
    assert!(other.stat("/shared").unwrap().is_dir());

    // A blank buffer is rejected outright.
    let blank = sfs_core::SharedBuffer::allocate(1 << 20);
    assert!(matches!(
        Filesystem::attach(blank).unwrap_err(),
        SfsError::BadMagic { .. }
    ));
}

#[test]
fn relative_paths_are_rejected() {
    let fs = small_fs();
    assert!(matches!(
        fs.stat("etc/hostname").unwrap_err(),
        SfsError::Invalid(_)
    ));
    assert!(matches!(fs.mkdir("x", 0o755).unwrap_err(), SfsError::Invalid(_)));
    assert!(matches!(
        fs.open("", OpenFlags::RDONLY, 0).unwrap_err(),
        SfsError::Invalid(_)
    ));
}

#[test]
fn import_file_seeds_in_one_call() {
    let fs = small_fs();
    fs.mkdir("/seed", 0o755).unwrap();

    let payload: Vec<u8> = (0..10_000_u32).map(|i| (i % 251) as u8).collect();
    fs.import_file("/seed/blob", &payload).unwrap();

    let st = fs.stat("/seed/blob").unwrap();
    assert_eq!(st.size, payload.len() as u64);

    let fd = fs.open("/seed/blob", OpenFlags::RDONLY, 0).unwrap();
    let mut back = vec![0_u8; payload.len()];
    assert_eq!(fs.pread(fd, &mut back, 0).unwrap(), payload.len());
    assert_eq!(back, payload);
    fs.close(fd).unwrap();

    // Re-import replaces the old content.
    fs.import_file("/seed/blob", b"tiny").unwrap();
    assert_eq!(fs.stat("/seed/blob").unwrap().size, 4);
}
