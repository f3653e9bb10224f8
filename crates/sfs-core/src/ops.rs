//! The operation surface: metadata, file I/O, directories, links, rename,
//! and permission updates.
//!
//! Paths are absolute; relative paths are an error. Failure semantics are
//! return-value-only: no retries, no partial success reported as success.
//! Short read/write counts occur only at end-of-file and end-of-space.

use crate::fd::OpenFile;
use crate::surface::{DirEntryInfo, FileStat, FsStats, OpenFlags, Whence};
use crate::{Filesystem, InodeNo};
use sfs_error::{Result, SfsError};
use sfs_ondisk::Inode;
use sfs_path::{ensure_absolute, normalize};
use sfs_types::{BLOCK_SIZE, MAX_NAME_LEN, PERM_MASK, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use tracing::debug;

/// Sentinel for `chown`: leave the field unchanged.
pub const NO_CHANGE: u32 = u32::MAX;

impl Filesystem {
    // ── Metadata ────────────────────────────────────────────────────────

    /// `stat`: follow symlinks to the final target.
    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let ino = self.resolve(path, true)?;
        let inode = self.read_live(ino, path)?;
        Ok(FileStat::from_inode(ino, &inode))
    }

    /// `lstat`: report a terminal symlink itself.
    pub fn lstat(&self, path: &str) -> Result<FileStat> {
        let ino = self.resolve(path, false)?;
        let inode = self.read_live(ino, path)?;
        Ok(FileStat::from_inode(ino, &inode))
    }

    /// Filesystem-wide counters. The free-block count walks the free
    /// chain, so it is a snapshot, exact only while no other context
    /// allocates.
    pub fn statfs(&self) -> Result<FsStats> {
        Ok(FsStats {
            block_size: BLOCK_SIZE as u32,
            total_blocks: self.geo.total_blocks,
            free_blocks: sfs_alloc::count_free_blocks(&self.shm, &self.geo)?,
            total_inodes: self.geo.inode_count,
            free_inodes: sfs_alloc::count_free_inodes(&self.shm, &self.geo)?,
            namelen: MAX_NAME_LEN as u32,
        })
    }

    // ── Open / close ────────────────────────────────────────────────────

    /// Open (and with `CREAT`, create) a regular file.
    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<i32> {
        ensure_absolute(path)?;
        let normalized = normalize(path);
        let follow = !flags.has(OpenFlags::NOFOLLOW);

        let ino = match self.resolve(&normalized, follow) {
            Ok(ino) => {
                if flags.has(OpenFlags::CREAT) && flags.has(OpenFlags::EXCL) {
                    return Err(SfsError::Exists);
                }
                self.open_existing(ino, &normalized, flags)?
            }
            Err(SfsError::NotFound(_)) if flags.has(OpenFlags::CREAT) => {
                self.create_file(&normalized, flags, mode)?
            }
            Err(err) => return Err(err),
        };

        let inode = self.read_live(ino, &normalized)?;
        let pos = if flags.has(OpenFlags::APPEND) {
            inode.size
        } else {
            0
        };
        let fd = self.fds.lock().insert(OpenFile {
            ino,
            flags,
            pos,
            path: normalized.clone(),
        });
        debug!(target: "sfs::ops", event = "open", path = %normalized, fd, ino = ino.0);
        Ok(fd)
    }

    fn open_existing(&self, ino: InodeNo, path: &str, flags: OpenFlags) -> Result<InodeNo> {
        let inode = self.read_live(ino, path)?;
        if inode.is_dir() {
            return Err(SfsError::IsDirectory);
        }
        if inode.is_symlink() {
            // Reachable only via NOFOLLOW; a link has no file content to
            // offer a descriptor.
            return Err(SfsError::invalid("cannot open a symlink itself"));
        }
        if flags.has(OpenFlags::TRUNC) {
            let mut inode = inode;
            sfs_blockmap::truncate_to(&self.shm, &self.geo, &mut inode, 0)?;
            sfs_inode::touch_mtime_ctime(&mut inode, self.now());
            self.persist(ino, &inode)?;
        }
        Ok(ino)
    }

    fn create_file(&self, normalized: &str, flags: OpenFlags, mode: u32) -> Result<InodeNo> {
        let parent_ref = self.resolve_parent(normalized)?;
        let mut parent_inode = self.read_live(parent_ref.parent, &parent_ref.parent_path)?;
        Self::expect_dir(&parent_inode)?;

        // The earlier resolve may have lost a creation race.
        if let Some((existing, _)) =
            sfs_dir::lookup(&self.shm, &self.geo, &parent_inode, &parent_ref.name)?
        {
            if flags.has(OpenFlags::EXCL) {
                return Err(SfsError::Exists);
            }
            return self.open_existing(existing, normalized, flags);
        }

        let now = self.now();
        let (ino, mut inode) = sfs_inode::create_inode(
            &self.shm,
            &self.geo,
            S_IFREG | (mode & PERM_MASK),
            0,
            0,
            now,
        )?;
        if let Err(err) = sfs_dir::add_entry(
            &self.shm,
            &self.geo,
            parent_ref.parent,
            &mut parent_inode,
            &parent_ref.name,
            ino,
            sfs_types::DT_REG,
            now,
        ) {
            sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, &mut inode)?;
            return Err(err);
        }
        self.invalidate_namespace(&parent_ref.parent_path);
        debug!(target: "sfs::ops", event = "create", path = %normalized, ino = ino.0);
        Ok(ino)
    }

    /// Release a descriptor.
    pub fn close(&self, fd: i32) -> Result<()> {
        self.fds.lock().remove(fd)?;
        Ok(())
    }

    fn fd_snapshot(&self, fd: i32) -> Result<OpenFile> {
        self.fds.lock().get(fd).map(|file| file.clone())
    }

    // ── File I/O ────────────────────────────────────────────────────────

    /// Read at the descriptor position, advancing it.
    pub fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        let file = self.fd_snapshot(fd)?;
        if !file.flags.readable() {
            return Err(SfsError::invalid("descriptor not open for reading"));
        }
        let n = self.read_and_touch(file.ino, &file.path, file.pos, buf)?;
        self.fds.lock().set_pos(fd, file.pos + n as u64);
        Ok(n)
    }

    /// Read at an explicit offset without moving the position.
    pub fn pread(&self, fd: i32, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.fd_snapshot(fd)?;
        if !file.flags.readable() {
            return Err(SfsError::invalid("descriptor not open for reading"));
        }
        self.read_and_touch(file.ino, &file.path, offset, buf)
    }

    fn read_and_touch(&self, ino: InodeNo, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut inode = self.read_live(ino, path)?;
        let n = sfs_blockmap::read_at(&self.shm, &self.geo, &inode, offset, buf)?;
        sfs_inode::touch_atime(&mut inode, self.now());
        self.persist(ino, &inode)?;
        Ok(n)
    }

    /// Write at the descriptor position (or at end-of-file with
    /// `APPEND`, re-reading the size on every call), advancing it.
    pub fn write(&self, fd: i32, data: &[u8]) -> Result<usize> {
        let file = self.fd_snapshot(fd)?;
        if !file.flags.writable() {
            return Err(SfsError::invalid("descriptor not open for writing"));
        }
        let mut inode = self.read_live(file.ino, &file.path)?;
        let pos = if file.flags.has(OpenFlags::APPEND) {
            inode.size
        } else {
            file.pos
        };
        let n = self.write_and_touch(file.ino, &mut inode, pos, data)?;
        self.fds.lock().set_pos(fd, pos + n as u64);
        Ok(n)
    }

    /// Write at an explicit offset without moving the position.
    pub fn pwrite(&self, fd: i32, data: &[u8], offset: u64) -> Result<usize> {
        let file = self.fd_snapshot(fd)?;
        if !file.flags.writable() {
            return Err(SfsError::invalid("descriptor not open for writing"));
        }
        let mut inode = self.read_live(file.ino, &file.path)?;
        self.write_and_touch(file.ino, &mut inode, offset, data)
    }

    fn write_and_touch(
        &self,
        ino: InodeNo,
        inode: &mut Inode,
        offset: u64,
        data: &[u8],
    ) -> Result<usize> {
        let n = sfs_blockmap::write_at(&self.shm, &self.geo, inode, offset, data)?;
        sfs_inode::touch_mtime_ctime(inode, self.now());
        self.persist(ino, inode)?;
        Ok(n)
    }

    /// Reposition a descriptor. The result clamps at 0 on the low end;
    /// seeking past end-of-file is allowed (writes there create holes).
    pub fn lseek(&self, fd: i32, offset: i64, whence: Whence) -> Result<u64> {
        let file = self.fd_snapshot(fd)?;
        let base: i128 = match whence {
            Whence::Set => 0,
            Whence::Cur => i128::from(file.pos),
            Whence::End => i128::from(self.read_live(file.ino, &file.path)?.size),
        };
        let target = base + i128::from(offset);
        let pos = u64::try_from(target.max(0)).unwrap_or(u64::MAX);
        self.fds.lock().set_pos(fd, pos);
        Ok(pos)
    }

    /// Cut or (sparsely) grow a file to `length` bytes. Blocks beyond the
    /// new length return to the free list.
    pub fn truncate(&self, path: &str, length: u64) -> Result<()> {
        let ino = self.resolve(path, true)?;
        let mut inode = self.read_live(ino, path)?;
        if inode.is_dir() {
            return Err(SfsError::IsDirectory);
        }
        let freed = sfs_blockmap::truncate_to(&self.shm, &self.geo, &mut inode, length)?;
        sfs_inode::touch_mtime_ctime(&mut inode, self.now());
        self.persist(ino, &inode)?;
        debug!(target: "sfs::ops", event = "truncate", path = %path, length, freed);
        Ok(())
    }

    // ── Directories ─────────────────────────────────────────────────────

    /// Create a directory.
    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        ensure_absolute(path)?;
        let normalized = normalize(path);
        if normalized == "/" {
            return Err(SfsError::Exists);
        }

        let parent_ref = self.resolve_parent(&normalized)?;
        let mut parent_inode = self.read_live(parent_ref.parent, &parent_ref.parent_path)?;
        Self::expect_dir(&parent_inode)?;
        if sfs_dir::lookup(&self.shm, &self.geo, &parent_inode, &parent_ref.name)?.is_some() {
            return Err(SfsError::Exists);
        }

        let now = self.now();
        let (ino, mut dir_inode) = sfs_inode::create_inode(
            &self.shm,
            &self.geo,
            S_IFDIR | (mode & PERM_MASK),
            0,
            0,
            now,
        )?;

        // The child's implied `..` raises the parent's link count.
        parent_inode.nlink += 1;
        if let Err(err) = sfs_dir::add_entry(
            &self.shm,
            &self.geo,
            parent_ref.parent,
            &mut parent_inode,
            &parent_ref.name,
            ino,
            sfs_types::DT_DIR,
            now,
        ) {
            sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, &mut dir_inode)?;
            return Err(err);
        }
        self.invalidate_namespace(&parent_ref.parent_path);
        debug!(target: "sfs::ops", event = "mkdir", path = %normalized, ino = ino.0);
        Ok(())
    }

    /// Remove an empty directory. The root cannot be removed.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        ensure_absolute(path)?;
        let normalized = normalize(path);
        if normalized == "/" {
            return Err(SfsError::invalid("cannot remove the root directory"));
        }

        let parent_ref = self.resolve_parent(&normalized)?;
        let mut parent_inode = self.read_live(parent_ref.parent, &parent_ref.parent_path)?;
        Self::expect_dir(&parent_inode)?;

        let Some((ino, _)) =
            sfs_dir::lookup(&self.shm, &self.geo, &parent_inode, &parent_ref.name)?
        else {
            return Err(SfsError::not_found(normalized));
        };
        let mut inode = self.read_live(ino, &normalized)?;
        if !inode.is_dir() {
            return Err(SfsError::NotDirectory);
        }
        if !sfs_dir::is_empty(&self.shm, &self.geo, &inode)? {
            return Err(SfsError::NotEmpty);
        }

        parent_inode.nlink -= 1;
        sfs_dir::remove_entry(
            &self.shm,
            &self.geo,
            parent_ref.parent,
            &mut parent_inode,
            &parent_ref.name,
            self.now(),
        )?;
        sfs_blockmap::free_all(&self.shm, &self.geo, &mut inode)?;
        sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, &mut inode)?;
        self.invalidate_namespace(&parent_ref.parent_path);
        debug!(target: "sfs::ops", event = "rmdir", path = %normalized, ino = ino.0);
        Ok(())
    }

    /// List a directory's live entries in slot order.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntryInfo>> {
        let ino = self.resolve(path, true)?;
        let mut inode = self.read_live(ino, path)?;
        Self::expect_dir(&inode)?;

        let entries = sfs_dir::list(&self.shm, &self.geo, &inode)?
            .into_iter()
            .map(|(name, ino, d_type)| DirEntryInfo {
                name,
                ino: ino.0,
                d_type,
            })
            .collect();
        sfs_inode::touch_atime(&mut inode, self.now());
        self.persist(ino, &inode)?;
        Ok(entries)
    }

    // ── Links, unlink, rename ───────────────────────────────────────────

    /// Remove a name; the inode is released when its last link drops.
    pub fn unlink(&self, path: &str) -> Result<()> {
        ensure_absolute(path)?;
        let normalized = normalize(path);
        if normalized == "/" {
            return Err(SfsError::IsDirectory);
        }

        let parent_ref = self.resolve_parent(&normalized)?;
        let mut parent_inode = self.read_live(parent_ref.parent, &parent_ref.parent_path)?;
        let Some((ino, _)) =
            sfs_dir::lookup(&self.shm, &self.geo, &parent_inode, &parent_ref.name)?
        else {
            return Err(SfsError::not_found(normalized));
        };
        let mut inode = self.read_live(ino, &normalized)?;
        if inode.is_dir() {
            return Err(SfsError::IsDirectory);
        }

        sfs_dir::remove_entry(
            &self.shm,
            &self.geo,
            parent_ref.parent,
            &mut parent_inode,
            &parent_ref.name,
            self.now(),
        )?;
        self.release_inode(ino, &mut inode)?;
        self.invalidate_namespace(&parent_ref.parent_path);
        debug!(target: "sfs::ops", event = "unlink", path = %normalized, ino = ino.0);
        Ok(())
    }

    /// Drop one link; free blocks and tombstone the inode at zero.
    fn release_inode(&self, ino: InodeNo, inode: &mut Inode) -> Result<()> {
        if inode.is_dir() || inode.nlink <= 1 {
            sfs_blockmap::free_all(&self.shm, &self.geo, inode)?;
            sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, inode)
        } else {
            inode.nlink -= 1;
            sfs_inode::touch_ctime(inode, self.now());
            self.persist(ino, inode)
        }
    }

    /// Create a symlink carrying `target` verbatim.
    pub fn symlink(&self, target: &str, linkpath: &str) -> Result<()> {
        if target.is_empty() {
            return Err(SfsError::invalid("empty symlink target"));
        }
        ensure_absolute(linkpath)?;
        let normalized = normalize(linkpath);
        if normalized == "/" {
            return Err(SfsError::Exists);
        }

        let parent_ref = self.resolve_parent(&normalized)?;
        let mut parent_inode = self.read_live(parent_ref.parent, &parent_ref.parent_path)?;
        Self::expect_dir(&parent_inode)?;
        if sfs_dir::lookup(&self.shm, &self.geo, &parent_inode, &parent_ref.name)?.is_some() {
            return Err(SfsError::Exists);
        }

        let now = self.now();
        let (ino, mut inode) =
            sfs_inode::create_inode(&self.shm, &self.geo, S_IFLNK | 0o777, 0, 0, now)?;

        let written =
            match sfs_blockmap::write_at(&self.shm, &self.geo, &mut inode, 0, target.as_bytes()) {
                Ok(n) => n,
                Err(err) => {
                    sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, &mut inode)?;
                    return Err(err);
                }
            };
        if written < target.len() {
            sfs_blockmap::free_all(&self.shm, &self.geo, &mut inode)?;
            sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, &mut inode)?;
            return Err(SfsError::NoSpace);
        }
        self.persist(ino, &inode)?;

        if let Err(err) = sfs_dir::add_entry(
            &self.shm,
            &self.geo,
            parent_ref.parent,
            &mut parent_inode,
            &parent_ref.name,
            ino,
            sfs_types::DT_LNK,
            now,
        ) {
            sfs_blockmap::free_all(&self.shm, &self.geo, &mut inode)?;
            sfs_inode::tombstone_inode(&self.shm, &self.geo, ino, &mut inode)?;
            return Err(err);
        }
        self.invalidate_namespace(&parent_ref.parent_path);
        debug!(target: "sfs::ops", event = "symlink", link = %normalized, target = %target);
        Ok(())
    }

    /// Read a symlink's target.
    pub fn readlink(&self, path: &str) -> Result<String> {
        let ino = self.resolve(path, false)?;
        let mut inode = self.read_live(ino, path)?;
        if !inode.is_symlink() {
            return Err(SfsError::invalid("not a symlink"));
        }
        let target = sfs_path::read_link_target(&self.shm, &self.geo, &inode)?;
        sfs_inode::touch_atime(&mut inode, self.now());
        self.persist(ino, &inode)?;
        Ok(target)
    }

    /// Add a second name for an existing file. Directories cannot be hard
    /// linked; a terminal symlink at `src` is linked itself.
    pub fn link(&self, src: &str, dst: &str) -> Result<()> {
        let src_ino = self.resolve(src, false)?;
        let mut src_inode = self.read_live(src_ino, src)?;
        if src_inode.is_dir() {
            return Err(SfsError::IsDirectory);
        }

        ensure_absolute(dst)?;
        let normalized = normalize(dst);
        if normalized == "/" {
            return Err(SfsError::Exists);
        }
        let parent_ref = self.resolve_parent(&normalized)?;
        let mut parent_inode = self.read_live(parent_ref.parent, &parent_ref.parent_path)?;
        Self::expect_dir(&parent_inode)?;
        if sfs_dir::lookup(&self.shm, &self.geo, &parent_inode, &parent_ref.name)?.is_some() {
            return Err(SfsError::Exists);
        }

        let now = self.now();
        src_inode.nlink += 1;
        sfs_inode::touch_ctime(&mut src_inode, now);
        self.persist(src_ino, &src_inode)?;

        if let Err(err) = sfs_dir::add_entry(
            &self.shm,
            &self.geo,
            parent_ref.parent,
            &mut parent_inode,
            &parent_ref.name,
            src_ino,
            src_inode.kind().dirent_type(),
            now,
        ) {
            src_inode.nlink -= 1;
            self.persist(src_ino, &src_inode)?;
            return Err(err);
        }
        self.invalidate_namespace(&parent_ref.parent_path);
        debug!(target: "sfs::ops", event = "link", src = %src, dst = %normalized, ino = src_ino.0);
        Ok(())
    }

    /// Move a name, replacing an existing destination.
    ///
    /// A replaced destination is released immediately: a file loses one
    /// link, an (empty) directory is freed. Both directory-entry edits are
    /// separate steps, so only same-thread observers see the sequence
    /// "source gone, then destination present".
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        ensure_absolute(src)?;
        ensure_absolute(dst)?;
        let s = normalize(src);
        let d = normalize(dst);
        if s == "/" || d == "/" {
            return Err(SfsError::invalid("cannot rename the root directory"));
        }
        if s == d {
            return Ok(());
        }
        if d.starts_with(&format!("{s}/")) {
            return Err(SfsError::invalid("destination lies inside the source"));
        }

        let src_ref = self.resolve_parent(&s)?;
        let dst_ref = self.resolve_parent(&d)?;

        let src_parent_inode = self.read_live(src_ref.parent, &src_ref.parent_path)?;
        let Some((src_ino, src_dtype)) =
            sfs_dir::lookup(&self.shm, &self.geo, &src_parent_inode, &src_ref.name)?
        else {
            return Err(SfsError::not_found(s));
        };
        let mut src_inode = self.read_live(src_ino, &s)?;
        let moving_dir = src_inode.is_dir();
        let cross_parent = src_ref.parent != dst_ref.parent;

        // Inspect the destination before editing anything.
        let dst_parent_inode = self.read_live(dst_ref.parent, &dst_ref.parent_path)?;
        Self::expect_dir(&dst_parent_inode)?;
        let replaced = sfs_dir::lookup(&self.shm, &self.geo, &dst_parent_inode, &dst_ref.name)?;
        if let Some((dst_ino, _)) = replaced {
            if dst_ino == src_ino {
                return Ok(());
            }
            let dst_inode = self.read_live(dst_ino, &d)?;
            if dst_inode.is_dir() {
                if !moving_dir {
                    return Err(SfsError::IsDirectory);
                }
                if !sfs_dir::is_empty(&self.shm, &self.geo, &dst_inode)? {
                    return Err(SfsError::NotEmpty);
                }
            } else if moving_dir {
                return Err(SfsError::NotDirectory);
            }
        }

        let now = self.now();

        // Drop the source entry.
        {
            let mut parent = self.read_live(src_ref.parent, &src_ref.parent_path)?;
            if moving_dir && cross_parent {
                parent.nlink -= 1;
            }
            sfs_dir::remove_entry(
                &self.shm,
                &self.geo,
                src_ref.parent,
                &mut parent,
                &src_ref.name,
                now,
            )?;
        }

        // Release a replaced destination.
        if let Some((dst_ino, _)) = replaced {
            let mut parent = self.read_live(dst_ref.parent, &dst_ref.parent_path)?;
            let mut dst_inode = self.read_live(dst_ino, &d)?;
            if dst_inode.is_dir() {
                parent.nlink -= 1;
            }
            sfs_dir::remove_entry(
                &self.shm,
                &self.geo,
                dst_ref.parent,
                &mut parent,
                &dst_ref.name,
                now,
            )?;
            self.release_inode(dst_ino, &mut dst_inode)?;
        }

        // Install the destination entry.
        let install = {
            let mut parent = self.read_live(dst_ref.parent, &dst_ref.parent_path)?;
            if moving_dir && cross_parent {
                parent.nlink += 1;
            }
            sfs_dir::add_entry(
                &self.shm,
                &self.geo,
                dst_ref.parent,
                &mut parent,
                &dst_ref.name,
                src_ino,
                src_dtype,
                now,
            )
        };
        if let Err(err) = install {
            // Put the source entry back so the inode stays reachable.
            let mut parent = self.read_live(src_ref.parent, &src_ref.parent_path)?;
            if moving_dir && cross_parent {
                parent.nlink += 1;
            }
            sfs_dir::add_entry(
                &self.shm,
                &self.geo,
                src_ref.parent,
                &mut parent,
                &src_ref.name,
                src_ino,
                src_dtype,
                now,
            )?;
            return Err(err);
        }

        sfs_inode::touch_ctime(&mut src_inode, now);
        self.persist(src_ino, &src_inode)?;

        self.invalidate_namespace(&src_ref.parent_path);
        self.invalidate_namespace(&dst_ref.parent_path);
        debug!(target: "sfs::ops", event = "rename", src = %s, dst = %d, ino = src_ino.0);
        Ok(())
    }

    // ── Permissions & timestamps ────────────────────────────────────────

    /// Replace the permission bits; the type bits are preserved.
    pub fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let ino = self.resolve(path, true)?;
        let mut inode = self.read_live(ino, path)?;
        inode.mode = (inode.mode & S_IFMT) | (mode & PERM_MASK);
        sfs_inode::touch_ctime(&mut inode, self.now());
        self.persist(ino, &inode)
    }

    /// Set owner and group; `NO_CHANGE` (`u32::MAX`, the C surface's -1)
    /// leaves a field untouched.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        let ino = self.resolve(path, true)?;
        let mut inode = self.read_live(ino, path)?;
        if uid != NO_CHANGE {
            inode.uid = uid;
        }
        if gid != NO_CHANGE {
            inode.gid = gid;
        }
        sfs_inode::touch_ctime(&mut inode, self.now());
        self.persist(ino, &inode)
    }

    /// Set access and modification times explicitly; ctime moves to now.
    pub fn utimes(&self, path: &str, atime: u32, mtime: u32) -> Result<()> {
        let ino = self.resolve(path, true)?;
        let mut inode = self.read_live(ino, path)?;
        inode.atime = atime;
        inode.mtime = mtime;
        sfs_inode::touch_ctime(&mut inode, self.now());
        self.persist(ino, &inode)
    }

    // ── Convenience ─────────────────────────────────────────────────────

    /// Seed a file from a host buffer in one call (create-or-replace,
    /// write everything, set the size). Parent directories must exist.
    pub fn import_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let fd = self.open(
            path,
            OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::TRUNC,
            0o644,
        )?;
        let outcome = self.import_payload(fd, data);
        let closed = self.close(fd);
        outcome?;
        closed
    }

    fn import_payload(&self, fd: i32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let n = self.pwrite(fd, data, 0)?;
        if n < data.len() {
            return Err(SfsError::NoSpace);
        }
        Ok(())
    }
}
