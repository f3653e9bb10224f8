//! Whole-filesystem consistency check.
//!
//! Walks every inode slot below the allocation high-water mark and the
//! free chain, proving that they partition the data region: each data
//! block is either reachable from exactly one live inode, on the free
//! list, or the reserved sentinel (block 0). Directory entries must
//! reference live inodes and the root must stay a directory with at least
//! two links.
//!
//! The walk is only meaningful while no other context is mutating the
//! buffer.

use crate::{Filesystem, InodeNo};
use serde::{Deserialize, Serialize};
use sfs_error::Result;
use sfs_ondisk::Superblock;
use sfs_types::{BLOCK_SIZE, BlockNo, FREE_LIST_END, blocks_covering, max_file_size};

/// Outcome of [`Filesystem::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub live_inodes: u32,
    pub tombstones: u32,
    /// Blocks reachable through some live inode's map (data + pointer).
    pub reachable_blocks: u32,
    /// Blocks on the free chain.
    pub free_blocks: u32,
    pub errors: Vec<String>,
}

impl CheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Filesystem {
    /// Verify the cross-structure invariants and report violations.
    pub fn check(&self) -> Result<CheckReport> {
        let sb = Superblock::read_from(&self.shm)?;
        let data_blocks = self.geo.data_block_count as usize;
        let mut owner = vec![false; data_blocks];
        let mut report = CheckReport {
            live_inodes: 0,
            tombstones: 0,
            reachable_blocks: 0,
            free_blocks: 0,
            errors: Vec::new(),
        };

        // Every inode slot below the high-water mark.
        for slot in 0..sb.next_free_inode {
            let ino = InodeNo(slot);
            let inode = sfs_inode::read_inode(&self.shm, &self.geo, ino)?;

            if inode.mode == 0 {
                if inode.nlink != 0 {
                    report
                        .errors
                        .push(format!("inode {ino}: released but nlink {}", inode.nlink));
                }
                report.tombstones += 1;
                continue;
            }
            report.live_inodes += 1;

            let owned = sfs_blockmap::owned_blocks(&self.shm, &self.geo, &inode)?;
            for block in &owned {
                let idx = block.0 as usize;
                if owner[idx] {
                    report
                        .errors
                        .push(format!("block {block} reachable from two inodes"));
                } else {
                    owner[idx] = true;
                    report.reachable_blocks += 1;
                }
            }

            if inode.size > max_file_size() {
                report
                    .errors
                    .push(format!("inode {ino}: size {} beyond map capacity", inode.size));
            }
            if u64::from(inode.blocks) > blocks_covering(inode.size) {
                report.errors.push(format!(
                    "inode {ino}: {} data blocks but size {} covers only {}",
                    inode.blocks,
                    inode.size,
                    blocks_covering(inode.size)
                ));
            }

            if inode.is_dir() {
                for (name, child, _) in sfs_dir::list(&self.shm, &self.geo, &inode)? {
                    let child_inode = sfs_inode::read_inode(&self.shm, &self.geo, child)?;
                    if child_inode.mode == 0 {
                        report.errors.push(format!(
                            "directory {ino}: entry {name} references released inode {child}"
                        ));
                    }
                }
            }
        }

        // The free chain: no cycles, no overlap with reachable blocks.
        let mut visited = vec![false; data_blocks];
        let mut cursor = sb.free_block_head;
        while cursor != FREE_LIST_END {
            let idx = cursor as usize;
            if idx >= data_blocks {
                report
                    .errors
                    .push(format!("free-list link {cursor} outside data region"));
                break;
            }
            if visited[idx] {
                report
                    .errors
                    .push(format!("free list revisits block {cursor}"));
                break;
            }
            visited[idx] = true;
            if owner[idx] {
                report
                    .errors
                    .push(format!("block {cursor} is both free and reachable"));
            }
            report.free_blocks += 1;
            cursor = self.shm.load_u32(self.geo.block_offset(BlockNo(cursor))?)?;
        }

        // Conservation: reachable + free + the reserved sentinel cover the
        // data region exactly.
        let covered = u64::from(report.reachable_blocks) + u64::from(report.free_blocks) + 1;
        if covered != u64::from(self.geo.data_block_count) {
            report.errors.push(format!(
                "conservation: {} reachable + {} free + 1 reserved != {} data blocks",
                report.reachable_blocks, report.free_blocks, self.geo.data_block_count
            ));
        }

        // The root is always a live directory with two or more links.
        let root = sfs_inode::read_inode(&self.shm, &self.geo, InodeNo::ROOT)?;
        if !root.is_dir() {
            report.errors.push("root inode is not a directory".to_owned());
        } else if root.nlink < 2 {
            report
                .errors
                .push(format!("root nlink {} below 2", root.nlink));
        }

        // Spot-check the superblock geometry still matches.
        if sb.block_size != BLOCK_SIZE as u32 {
            report
                .errors
                .push(format!("superblock block size {}", sb.block_size));
        }

        Ok(report)
    }
}
