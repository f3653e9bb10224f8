#![forbid(unsafe_code)]
//! Directory operations.
//!
//! A directory's data blocks hold an ordered sequence of fixed-size
//! 32-byte entry slots; a slot with inode 0 is free. Lookup is a linear
//! scan, insertion reuses the first free slot (allocating a fresh block
//! when none is free), and removal zeroes the slot in place. Directory
//! blocks are never compacted or returned early.
//!
//! `.` and `..` are never stored; the resolver collapses them textually,
//! so every slot names a real child.

use sfs_error::{Result, SfsError};
use sfs_ondisk::{Geometry, Inode, RawDirent, encode_dirent};
use sfs_shm::SharedBuffer;
use sfs_types::{BLOCK_SIZE, DIRENT_SIZE, DIRENTS_PER_BLOCK, InodeNo};

/// A located directory entry: its decoded form plus the absolute buffer
/// offset of its slot.
#[derive(Debug, Clone)]
struct FoundSlot {
    offset: usize,
    entry: RawDirent,
}

/// Scan every allocated directory block, calling `visit` for each slot.
///
/// `visit` receives the slot's absolute offset and its decoded entry and
/// returns `true` to stop the walk. Directories have no holes, so the walk
/// ends at the first unmapped block.
fn walk_slots(
    shm: &SharedBuffer,
    geo: &Geometry,
    dir: &Inode,
    mut visit: impl FnMut(usize, RawDirent) -> Result<bool>,
) -> Result<()> {
    let mut fb = 0_u64;
    while let Some(block) = sfs_blockmap::map_file_block(shm, geo, dir, fb)? {
        let base = geo.block_offset(block)?;
        let mut raw = [0_u8; DIRENT_SIZE];
        for slot in 0..DIRENTS_PER_BLOCK {
            let offset = base + slot * DIRENT_SIZE;
            shm.read_bytes(offset, &mut raw)?;
            let entry = RawDirent::decode(&raw)?;
            if visit(offset, entry)? {
                return Ok(());
            }
        }
        fb += 1;
    }
    Ok(())
}

fn find_slot(
    shm: &SharedBuffer,
    geo: &Geometry,
    dir: &Inode,
    name: &str,
) -> Result<Option<FoundSlot>> {
    let needle = name.as_bytes();
    let mut found = None;
    walk_slots(shm, geo, dir, |offset, entry| {
        if !entry.is_free() && entry.name_bytes()? == needle {
            found = Some(FoundSlot { offset, entry });
            return Ok(true);
        }
        Ok(false)
    })?;
    Ok(found)
}

/// Look up `name` in the directory; names compare byte-for-byte.
pub fn lookup(
    shm: &SharedBuffer,
    geo: &Geometry,
    dir: &Inode,
    name: &str,
) -> Result<Option<(InodeNo, u16)>> {
    Ok(find_slot(shm, geo, dir, name)?
        .map(|found| (InodeNo(found.entry.ino), found.entry.d_type)))
}

/// Insert an entry for `name` into the first free slot.
///
/// The caller has already established that `name` is absent. Extends the
/// directory by one block when every slot is occupied, updates `size` when
/// the new entry lies past it, and refreshes mtime/ctime. The directory
/// inode is persisted before returning.
pub fn add_entry(
    shm: &SharedBuffer,
    geo: &Geometry,
    dir_ino: InodeNo,
    dir: &mut Inode,
    name: &str,
    target: InodeNo,
    d_type: u16,
    now: u32,
) -> Result<()> {
    let raw = encode_dirent(target, d_type, name)?;

    let mut free_offset = None;
    walk_slots(shm, geo, dir, |offset, entry| {
        if entry.is_free() {
            free_offset = Some(offset);
            return Ok(true);
        }
        Ok(false)
    })?;
    if free_offset.is_none() {
        // Every slot is occupied: extend by one block and use its slot 0.
        let mut fb = 0_u64;
        while sfs_blockmap::map_file_block(shm, geo, dir, fb)?.is_some() {
            fb += 1;
        }
        let block = sfs_blockmap::ensure_file_block(shm, geo, dir, fb)?;
        free_offset = Some(geo.block_offset(block)?);
    }

    let offset = free_offset.ok_or_else(|| SfsError::corruption("no directory slot found"))?;
    shm.write_bytes(offset, &raw)?;

    // Slot position relative to the directory's first block.
    let slot_end = slot_end_within_dir(shm, geo, dir, offset)?;
    if slot_end > dir.size {
        dir.size = slot_end;
    }
    sfs_inode::touch_mtime_ctime(dir, now);
    sfs_inode::write_inode(shm, geo, dir_ino, dir)
}

/// Byte position one past `offset`'s slot, measured inside the directory.
fn slot_end_within_dir(
    shm: &SharedBuffer,
    geo: &Geometry,
    dir: &Inode,
    offset: usize,
) -> Result<u64> {
    let mut fb = 0_u64;
    while let Some(block) = sfs_blockmap::map_file_block(shm, geo, dir, fb)? {
        let base = geo.block_offset(block)?;
        if (base..base + BLOCK_SIZE).contains(&offset) {
            return Ok(fb * BLOCK_SIZE as u64 + (offset - base) as u64 + DIRENT_SIZE as u64);
        }
        fb += 1;
    }
    Err(SfsError::corruption("slot offset outside directory blocks"))
}

/// Remove `name`'s entry by zeroing its slot.
///
/// Returns the removed target and its d_type, or `None` when the name is
/// absent. Refreshes mtime/ctime and persists the directory inode.
pub fn remove_entry(
    shm: &SharedBuffer,
    geo: &Geometry,
    dir_ino: InodeNo,
    dir: &mut Inode,
    name: &str,
    now: u32,
) -> Result<Option<(InodeNo, u16)>> {
    let Some(found) = find_slot(shm, geo, dir, name)? else {
        return Ok(None);
    };
    shm.fill_zero(found.offset, DIRENT_SIZE)?;
    sfs_inode::touch_mtime_ctime(dir, now);
    sfs_inode::write_inode(shm, geo, dir_ino, dir)?;
    Ok(Some((InodeNo(found.entry.ino), found.entry.d_type)))
}

/// All live entries in slot order.
pub fn list(shm: &SharedBuffer, geo: &Geometry, dir: &Inode) -> Result<Vec<(String, InodeNo, u16)>> {
    let mut entries = Vec::new();
    walk_slots(shm, geo, dir, |_, entry| {
        if !entry.is_free() {
            entries.push((entry.name_str()?.to_owned(), InodeNo(entry.ino), entry.d_type));
        }
        Ok(false)
    })?;
    Ok(entries)
}

/// Whether the directory holds no live entries.
pub fn is_empty(shm: &SharedBuffer, geo: &Geometry, dir: &Inode) -> Result<bool> {
    let mut empty = true;
    walk_slots(shm, geo, dir, |_, entry| {
        if !entry.is_free() {
            empty = false;
            return Ok(true);
        }
        Ok(false)
    })?;
    Ok(empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_ondisk::Superblock;
    use sfs_types::{DT_DIR, DT_REG, S_IFDIR};
    use std::sync::Arc;

    fn fresh_dir() -> (Arc<SharedBuffer>, Geometry, InodeNo, Inode) {
        let len = 2 << 20;
        let shm = SharedBuffer::allocate(len);
        let geo = Geometry::for_new_buffer(len, None).unwrap();
        Superblock::for_geometry(&geo).write_to(&shm).unwrap();
        sfs_alloc::thread_free_list(&shm, &geo).unwrap();

        let (ino, dir) =
            sfs_inode::create_inode(&shm, &geo, S_IFDIR | 0o755, 0, 0, 1_000).unwrap();
        (shm, geo, ino, dir)
    }

    #[test]
    fn empty_directory_has_no_entries() {
        let (shm, geo, _, dir) = fresh_dir();
        assert!(is_empty(&shm, &geo, &dir).unwrap());
        assert_eq!(lookup(&shm, &geo, &dir, "missing").unwrap(), None);
        assert!(list(&shm, &geo, &dir).unwrap().is_empty());
    }

    #[test]
    fn add_lookup_remove_cycle() {
        let (shm, geo, ino, mut dir) = fresh_dir();

        add_entry(&shm, &geo, ino, &mut dir, "etc", InodeNo(5), DT_DIR, 1_001).unwrap();
        assert!(!is_empty(&shm, &geo, &dir).unwrap());
        assert_eq!(dir.size, DIRENT_SIZE as u64);
        assert_eq!(dir.mtime, 1_001);

        assert_eq!(
            lookup(&shm, &geo, &dir, "etc").unwrap(),
            Some((InodeNo(5), DT_DIR))
        );

        let removed = remove_entry(&shm, &geo, ino, &mut dir, "etc", 1_002).unwrap();
        assert_eq!(removed, Some((InodeNo(5), DT_DIR)));
        assert_eq!(lookup(&shm, &geo, &dir, "etc").unwrap(), None);
        assert!(is_empty(&shm, &geo, &dir).unwrap());
        assert_eq!(dir.mtime, 1_002);
    }

    #[test]
    fn names_compare_byte_exact() {
        let (shm, geo, ino, mut dir) = fresh_dir();
        add_entry(&shm, &geo, ino, &mut dir, "Config", InodeNo(7), DT_REG, 1).unwrap();

        assert_eq!(lookup(&shm, &geo, &dir, "config").unwrap(), None);
        assert_eq!(
            lookup(&shm, &geo, &dir, "Config").unwrap(),
            Some((InodeNo(7), DT_REG))
        );
        // Prefix of a stored name must not match.
        assert_eq!(lookup(&shm, &geo, &dir, "Conf").unwrap(), None);
    }

    #[test]
    fn removal_frees_the_slot_for_reuse() {
        let (shm, geo, ino, mut dir) = fresh_dir();

        add_entry(&shm, &geo, ino, &mut dir, "a", InodeNo(2), DT_REG, 1).unwrap();
        add_entry(&shm, &geo, ino, &mut dir, "b", InodeNo(3), DT_REG, 1).unwrap();
        remove_entry(&shm, &geo, ino, &mut dir, "a", 2).unwrap();

        // "c" lands in the zeroed first slot, before "b".
        add_entry(&shm, &geo, ino, &mut dir, "c", InodeNo(4), DT_REG, 3).unwrap();
        let names: Vec<String> = list(&shm, &geo, &dir)
            .unwrap()
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names, ["c", "b"]);
        // Size did not grow past the two original slots.
        assert_eq!(dir.size, 2 * DIRENT_SIZE as u64);
    }

    #[test]
    fn overflowing_a_block_allocates_the_next() {
        let (shm, geo, ino, mut dir) = fresh_dir();

        for i in 0..DIRENTS_PER_BLOCK {
            let name = format!("f{i}");
            add_entry(&shm, &geo, ino, &mut dir, &name, InodeNo(10 + i as u32), DT_REG, 1)
                .unwrap();
        }
        assert_eq!(dir.blocks, 1);
        assert_eq!(dir.size, BLOCK_SIZE as u64);

        add_entry(&shm, &geo, ino, &mut dir, "straggler", InodeNo(999), DT_REG, 2).unwrap();
        assert_eq!(dir.blocks, 2);
        assert_eq!(dir.size, BLOCK_SIZE as u64 + DIRENT_SIZE as u64);
        assert_eq!(
            lookup(&shm, &geo, &dir, "straggler").unwrap(),
            Some((InodeNo(999), DT_REG))
        );
        assert_eq!(list(&shm, &geo, &dir).unwrap().len(), DIRENTS_PER_BLOCK + 1);
    }

    #[test]
    fn list_preserves_slot_order() {
        let (shm, geo, ino, mut dir) = fresh_dir();
        for name in ["zeta", "alpha", "mid"] {
            add_entry(&shm, &geo, ino, &mut dir, name, InodeNo(50), DT_REG, 1).unwrap();
        }
        let names: Vec<String> = list(&shm, &geo, &dir)
            .unwrap()
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn long_names_are_rejected() {
        let (shm, geo, ino, mut dir) = fresh_dir();
        let too_long = "x".repeat(25);
        assert_eq!(
            add_entry(&shm, &geo, ino, &mut dir, &too_long, InodeNo(5), DT_REG, 1).unwrap_err(),
            SfsError::NameTooLong
        );
    }
}
