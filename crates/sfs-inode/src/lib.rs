#![forbid(unsafe_code)]
//! Inode table I/O.
//!
//! Read, write, create, and tombstone inode records, plus the timestamp
//! touch helpers every mutating operation goes through. Wall-clock seconds
//! are passed in by the caller so tests can drive time explicitly.

use sfs_error::{Result, SfsError};
use sfs_ondisk::{Geometry, Inode};
use sfs_shm::SharedBuffer;
use sfs_types::{INODE_SIZE, InodeNo};

// ── Read / write ────────────────────────────────────────────────────────────

/// Read and decode an inode record.
pub fn read_inode(shm: &SharedBuffer, geo: &Geometry, ino: InodeNo) -> Result<Inode> {
    let offset = geo.inode_offset(ino)?;
    let mut raw = [0_u8; INODE_SIZE];
    shm.read_bytes(offset, &mut raw)?;
    Inode::decode(&raw)
}

/// Read an inode that must describe a live object; a tombstoned or
/// never-written slot reports `what` as missing.
pub fn read_live_inode(
    shm: &SharedBuffer,
    geo: &Geometry,
    ino: InodeNo,
    what: &str,
) -> Result<Inode> {
    let inode = read_inode(shm, geo, ino)?;
    if inode.mode == 0 {
        return Err(SfsError::not_found(what));
    }
    Ok(inode)
}

/// Encode and write an inode record.
pub fn write_inode(shm: &SharedBuffer, geo: &Geometry, ino: InodeNo, inode: &Inode) -> Result<()> {
    let offset = geo.inode_offset(ino)?;
    shm.write_bytes(offset, &inode.encode())
}

// ── Create / tombstone ──────────────────────────────────────────────────────

/// Allocate a slot and write a fresh inode of the given mode into it.
///
/// Directories start with `nlink = 2`, everything else with `nlink = 1`.
pub fn create_inode(
    shm: &SharedBuffer,
    geo: &Geometry,
    mode: u32,
    uid: u32,
    gid: u32,
    now: u32,
) -> Result<(InodeNo, Inode)> {
    let ino = sfs_alloc::alloc_inode(shm, geo)?;
    let inode = Inode::new(mode, uid, gid, now);
    write_inode(shm, geo, ino, &inode)?;
    Ok((ino, inode))
}

/// Mark an inode slot as released: mode 0, nlink 0, empty map.
///
/// The caller frees the inode's blocks first; tombstoned slots are never
/// recycled by the allocator.
pub fn tombstone_inode(
    shm: &SharedBuffer,
    geo: &Geometry,
    ino: InodeNo,
    inode: &mut Inode,
) -> Result<()> {
    inode.mode = 0;
    inode.nlink = 0;
    inode.size = 0;
    inode.blocks = 0;
    inode.direct = [0; sfs_types::DIRECT_BLOCKS];
    inode.indirect = 0;
    inode.double_indirect = 0;
    write_inode(shm, geo, ino, inode)
}

// ── Timestamps ──────────────────────────────────────────────────────────────

/// Touch atime only (reads).
pub fn touch_atime(inode: &mut Inode, now: u32) {
    inode.atime = now;
}

/// Touch mtime and ctime (content mutation).
pub fn touch_mtime_ctime(inode: &mut Inode, now: u32) {
    inode.mtime = now;
    inode.ctime = now;
}

/// Touch ctime only (metadata mutation such as chmod/chown/link).
pub fn touch_ctime(inode: &mut Inode, now: u32) {
    inode.ctime = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_ondisk::Superblock;
    use sfs_types::{S_IFDIR, S_IFREG};
    use std::sync::Arc;

    fn fresh_fs() -> (Arc<SharedBuffer>, Geometry) {
        let len = 1 << 20;
        let shm = SharedBuffer::allocate(len);
        let geo = Geometry::for_new_buffer(len, None).unwrap();
        Superblock::for_geometry(&geo).write_to(&shm).unwrap();
        sfs_alloc::thread_free_list(&shm, &geo).unwrap();
        (shm, geo)
    }

    #[test]
    fn create_and_read_back() {
        let (shm, geo) = fresh_fs();

        let (ino, created) =
            create_inode(&shm, &geo, S_IFREG | 0o644, 1000, 1000, 1_700_000_000).unwrap();
        assert_eq!(ino, InodeNo(1));
        assert_eq!(created.nlink, 1);

        let back = read_inode(&shm, &geo, ino).unwrap();
        assert_eq!(back, created);
        assert_eq!(back.mode, S_IFREG | 0o644);
        assert_eq!(back.uid, 1000);
        assert_eq!(back.atime, 1_700_000_000);
    }

    #[test]
    fn directory_starts_with_two_links() {
        let (shm, geo) = fresh_fs();
        let (_, dir) = create_inode(&shm, &geo, S_IFDIR | 0o755, 0, 0, 1).unwrap();
        assert_eq!(dir.nlink, 2);
        assert!(dir.is_dir());
    }

    #[test]
    fn live_read_rejects_tombstones() {
        let (shm, geo) = fresh_fs();
        let (ino, mut inode) = create_inode(&shm, &geo, S_IFREG | 0o644, 0, 0, 1).unwrap();

        read_live_inode(&shm, &geo, ino, "/f").unwrap();

        tombstone_inode(&shm, &geo, ino, &mut inode).unwrap();
        assert!(inode.is_tombstone());
        assert!(matches!(
            read_live_inode(&shm, &geo, ino, "/f").unwrap_err(),
            SfsError::NotFound(_)
        ));

        // The slot is still occupied as far as allocation goes.
        let next = sfs_alloc::alloc_inode(&shm, &geo).unwrap();
        assert!(next.0 > ino.0);
    }

    #[test]
    fn tombstone_clears_the_map() {
        let (shm, geo) = fresh_fs();
        let (ino, mut inode) = create_inode(&shm, &geo, S_IFREG | 0o644, 0, 0, 1).unwrap();
        inode.size = 9999;
        inode.blocks = 3;
        inode.direct[0] = 5;
        inode.indirect = 6;
        inode.double_indirect = 7;

        tombstone_inode(&shm, &geo, ino, &mut inode).unwrap();
        let back = read_inode(&shm, &geo, ino).unwrap();
        assert_eq!(back.size, 0);
        assert_eq!(back.blocks, 0);
        assert_eq!(back.direct, [0; 8]);
        assert_eq!(back.indirect, 0);
        assert_eq!(back.double_indirect, 0);
    }

    #[test]
    fn touch_helpers_update_the_right_fields() {
        let mut inode = Inode::new(S_IFREG | 0o644, 0, 0, 100);

        touch_atime(&mut inode, 200);
        assert_eq!((inode.atime, inode.mtime, inode.ctime), (200, 100, 100));

        touch_mtime_ctime(&mut inode, 300);
        assert_eq!((inode.atime, inode.mtime, inode.ctime), (200, 300, 300));

        touch_ctime(&mut inode, 400);
        assert_eq!((inode.atime, inode.mtime, inode.ctime), (200, 300, 400));
    }

    #[test]
    fn out_of_range_inode_is_corruption() {
        let (shm, geo) = fresh_fs();
        let err = read_inode(&shm, &geo, InodeNo(geo.inode_count)).unwrap_err();
        assert!(matches!(err, SfsError::Corruption { .. }));
    }
}
