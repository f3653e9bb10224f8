//! Per-context descriptor table.
//!
//! Descriptor numbers start at 3 and grow monotonically; closed numbers
//! are never reused. The table is context-local: two attached contexts
//! hand out numbers independently.

use crate::surface::OpenFlags;
use sfs_error::{Result, SfsError};
use sfs_types::InodeNo;
use std::collections::HashMap;

/// State carried by one open descriptor.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub ino: InodeNo,
    pub flags: OpenFlags,
    pub pos: u64,
    /// Normalized path at open time, kept for diagnostics.
    pub path: String,
}

#[derive(Debug)]
pub(crate) struct FdTable {
    open: HashMap<i32, OpenFile>,
    next: i32,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
            next: 3,
        }
    }

    pub fn insert(&mut self, file: OpenFile) -> i32 {
        let fd = self.next;
        self.next += 1;
        self.open.insert(fd, file);
        fd
    }

    pub fn get(&self, fd: i32) -> Result<&OpenFile> {
        self.open.get(&fd).ok_or(SfsError::BadDescriptor(fd))
    }

    pub fn remove(&mut self, fd: i32) -> Result<OpenFile> {
        self.open.remove(&fd).ok_or(SfsError::BadDescriptor(fd))
    }

    /// Update a descriptor's position; a concurrently closed descriptor is
    /// left alone.
    pub fn set_pos(&mut self, fd: i32, pos: u64) {
        if let Some(file) = self.open.get_mut(&fd) {
            file.pos = pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(ino: u32) -> OpenFile {
        OpenFile {
            ino: InodeNo(ino),
            flags: OpenFlags::RDONLY,
            pos: 0,
            path: format!("/f{ino}"),
        }
    }

    #[test]
    fn numbering_starts_at_three_and_never_reuses() {
        let mut table = FdTable::new();
        let a = table.insert(file(1));
        let b = table.insert(file(2));
        assert_eq!((a, b), (3, 4));

        table.remove(a).unwrap();
        let c = table.insert(file(3));
        assert_eq!(c, 5);
    }

    #[test]
    fn unknown_descriptor_is_rejected() {
        let mut table = FdTable::new();
        assert_eq!(table.get(3).unwrap_err(), SfsError::BadDescriptor(3));
        assert_eq!(table.remove(9).unwrap_err(), SfsError::BadDescriptor(9));
    }

    #[test]
    fn set_pos_ignores_closed_descriptors() {
        let mut table = FdTable::new();
        let fd = table.insert(file(1));
        table.set_pos(fd, 10);
        assert_eq!(table.get(fd).unwrap().pos, 10);
        table.remove(fd).unwrap();
        table.set_pos(fd, 99); // no-op
    }
}
