//! Public value types of the operation surface.

use serde::{Deserialize, Serialize};
use sfs_ondisk::Inode;
use sfs_types::{InodeNo, PERM_MASK, mode_is_dir, mode_is_file, mode_is_symlink};
use std::ops::BitOr;

// ── Options ─────────────────────────────────────────────────────────────────

/// Format/attach options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsOptions {
    /// Override the inode count chosen at format time.
    pub inode_count: Option<u32>,
    /// Enable the per-context path cache. Mutations made through other
    /// contexts cannot invalidate it, so leave it off unless this context
    /// is the only namespace writer.
    pub path_cache: bool,
}

// ── Open flags ──────────────────────────────────────────────────────────────

/// Open flags; bit values follow the original C surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const RDONLY: Self = Self(0x0000);
    pub const WRONLY: Self = Self(0x0001);
    pub const RDWR: Self = Self(0x0002);
    pub const CREAT: Self = Self(0x0040);
    pub const EXCL: Self = Self(0x0080);
    pub const TRUNC: Self = Self(0x0200);
    pub const APPEND: Self = Self(0x0400);
    pub const NOFOLLOW: Self = Self(0x2_0000);

    const ACCESS_MASK: u32 = 0x3;

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether any of `flag`'s bits are set (not meaningful for the
    /// zero-valued `RDONLY`; use `readable`/`writable` for access mode).
    #[must_use]
    pub fn has(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    #[must_use]
    pub fn readable(self) -> bool {
        matches!(self.0 & Self::ACCESS_MASK, 0x0 | 0x2)
    }

    #[must_use]
    pub fn writable(self) -> bool {
        matches!(self.0 & Self::ACCESS_MASK, 0x1 | 0x2)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Seek ────────────────────────────────────────────────────────────────────

/// `lseek` origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Whence {
    Set,
    Cur,
    End,
}

// ── Stat results ────────────────────────────────────────────────────────────

/// Result of `stat`/`lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub ino: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Data blocks allocated through the block map.
    pub blocks: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl FileStat {
    pub(crate) fn from_inode(ino: InodeNo, inode: &Inode) -> Self {
        Self {
            ino: ino.0,
            mode: inode.mode,
            nlink: inode.nlink,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            blocks: inode.blocks,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        mode_is_dir(self.mode)
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        mode_is_file(self.mode)
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        mode_is_symlink(self.mode)
    }

    /// Permission bits only.
    #[must_use]
    pub fn perm(&self) -> u32 {
        self.mode & PERM_MASK
    }
}

/// Result of `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStats {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub namelen: u32,
}

/// One `readdir` entry, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub ino: u32,
    /// POSIX d_type value, stored verbatim.
    pub d_type: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_types::{S_IFDIR, S_IFREG};

    #[test]
    fn flag_composition() {
        let flags = OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::TRUNC;
        assert!(flags.has(OpenFlags::CREAT));
        assert!(flags.has(OpenFlags::TRUNC));
        assert!(!flags.has(OpenFlags::APPEND));
        assert!(flags.writable());
        assert!(!flags.readable());
    }

    #[test]
    fn access_modes() {
        assert!(OpenFlags::RDONLY.readable());
        assert!(!OpenFlags::RDONLY.writable());
        assert!(OpenFlags::WRONLY.writable());
        assert!(!OpenFlags::WRONLY.readable());
        assert!(OpenFlags::RDWR.readable());
        assert!(OpenFlags::RDWR.writable());
    }

    #[test]
    fn flag_bits_round_trip() {
        let flags = OpenFlags::CREAT | OpenFlags::EXCL;
        assert_eq!(OpenFlags::from_bits(flags.bits()), flags);
        assert_eq!(OpenFlags::CREAT.bits(), 0x40);
        assert_eq!(OpenFlags::TRUNC.bits(), 0x200);
        assert_eq!(OpenFlags::APPEND.bits(), 0x400);
    }

    #[test]
    fn stat_kind_helpers() {
        let inode = Inode::new(S_IFDIR | 0o750, 7, 8, 9);
        let st = FileStat::from_inode(InodeNo(3), &inode);
        assert!(st.is_dir());
        assert!(!st.is_file());
        assert_eq!(st.perm(), 0o750);
        assert_eq!(st.ino, 3);
        assert_eq!(st.nlink, 2);

        let inode = Inode::new(S_IFREG | 0o644, 0, 0, 0);
        let st = FileStat::from_inode(InodeNo(4), &inode);
        assert!(st.is_file());
        assert_eq!(st.perm(), 0o644);
    }
}
