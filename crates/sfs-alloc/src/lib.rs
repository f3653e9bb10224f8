#![forbid(unsafe_code)]
//! Block and inode allocation.
//!
//! Two lock-free allocators share the superblock:
//!
//! 1. **Block allocator** — an intrusive singly-linked free list. The head
//!    is the superblock word at `SB_FREE_HEAD_OFF`; each free block stores
//!    its successor in its own first four bytes; `FREE_LIST_END`
//!    terminates the chain. Pop and push are CAS loops on the head.
//! 2. **Inode allocator** — a CAS bump of `SB_NEXT_INODE_OFF`. Released
//!    inodes become tombstones in place and are never handed out again,
//!    so the counter is a monotone high-water mark.
//!
//! Both are linearizable with respect to their own word; neither takes a
//! lock.

use sfs_error::{Result, SfsError};
use sfs_ondisk::{Geometry, SB_FREE_HEAD_OFF, SB_NEXT_INODE_OFF, initial_free_list_next};
use sfs_shm::SharedBuffer;
use sfs_types::{BLOCK_SIZE, BlockNo, FREE_LIST_END, INODE_SIZE, InodeNo};
use tracing::trace;

// ── Format-time free-list threading ─────────────────────────────────────────

/// Thread the initial free list through the data region.
///
/// Blocks `1..data_block_count` join the list in ascending order; block 0
/// is left out so that pointer value 0 can mean "hole".
pub fn thread_free_list(shm: &SharedBuffer, geo: &Geometry) -> Result<()> {
    for block in 1..geo.data_block_count {
        let next = initial_free_list_next(block, geo.data_block_count);
        let offset = geo.block_offset(BlockNo(block))?;
        shm.store_u32(offset, next)?;
    }
    Ok(())
}

// ── Block allocator ─────────────────────────────────────────────────────────

/// Pop a block off the free list, zero it, and return its number.
///
/// The successor pointer is read before the CAS publishes the new head, so
/// a successful pop always observed a consistent link. If this block is
/// popped, pushed back, and re-exposed at the head between the head load
/// and the CAS, the CAS can install a stale successor (classic ABA); the
/// persisted layout pins the head to a bare u32, leaving no room for a tag
/// word, so the window is accepted and conservation is checked by
/// `count_free_blocks`.
pub fn alloc_block(shm: &SharedBuffer, geo: &Geometry) -> Result<BlockNo> {
    loop {
        let head = shm.load_u32(SB_FREE_HEAD_OFF)?;
        if head == FREE_LIST_END {
            return Err(SfsError::NoSpace);
        }
        if !geo.contains_block(head) {
            return Err(SfsError::Corruption {
                detail: format!("free-list head {head} outside data region"),
            });
        }

        let head_offset = geo.block_offset(BlockNo(head))?;
        let next = shm.load_u32(head_offset)?;
        if shm.compare_exchange_u32(SB_FREE_HEAD_OFF, head, next)? {
            shm.fill_zero(head_offset, BLOCK_SIZE)?;
            trace!(target: "sfs::alloc", event = "block_pop", block = head, next);
            return Ok(BlockNo(head));
        }
    }
}

/// Push a block back onto the free list head.
///
/// The block's successor pointer is written before the CAS publishes it,
/// so readers that win the next pop see a complete link.
pub fn free_block(shm: &SharedBuffer, geo: &Geometry, block: BlockNo) -> Result<()> {
    if !geo.contains_block(block.0) {
        return Err(SfsError::Corruption {
            detail: format!("freeing block {block} outside data region"),
        });
    }
    let block_offset = geo.block_offset(block)?;

    loop {
        let head = shm.load_u32(SB_FREE_HEAD_OFF)?;
        shm.store_u32(block_offset, head)?;
        if shm.compare_exchange_u32(SB_FREE_HEAD_OFF, head, block.0)? {
            trace!(target: "sfs::alloc", event = "block_push", block = block.0, old_head = head);
            return Ok(());
        }
    }
}

/// Walk the free chain and count its blocks.
///
/// The walk is bounded by `data_block_count` hops; exceeding the bound
/// means the chain is cyclic and is reported as corruption. Only
/// meaningful while no other thread is mutating the list.
pub fn count_free_blocks(shm: &SharedBuffer, geo: &Geometry) -> Result<u32> {
    let mut cursor = shm.load_u32(SB_FREE_HEAD_OFF)?;
    let mut count = 0_u32;
    while cursor != FREE_LIST_END {
        if !geo.contains_block(cursor) {
            return Err(SfsError::Corruption {
                detail: format!("free-list link {cursor} outside data region"),
            });
        }
        count += 1;
        if count > geo.data_block_count {
            return Err(SfsError::corruption("free list contains a cycle"));
        }
        cursor = shm.load_u32(geo.block_offset(BlockNo(cursor))?)?;
    }
    Ok(count)
}

// ── Inode allocator ─────────────────────────────────────────────────────────

/// Bump-allocate the next inode slot and zero its record.
pub fn alloc_inode(shm: &SharedBuffer, geo: &Geometry) -> Result<InodeNo> {
    loop {
        let n = shm.load_u32(SB_NEXT_INODE_OFF)?;
        if n >= geo.inode_count {
            return Err(SfsError::NoSpace);
        }
        if shm.compare_exchange_u32(SB_NEXT_INODE_OFF, n, n + 1)? {
            let ino = InodeNo(n);
            shm.fill_zero(geo.inode_offset(ino)?, INODE_SIZE)?;
            trace!(target: "sfs::alloc", event = "inode_bump", ino = n);
            return Ok(ino);
        }
    }
}

/// Number of inode slots never handed out. Tombstoned slots are not free.
pub fn count_free_inodes(shm: &SharedBuffer, geo: &Geometry) -> Result<u32> {
    let next = shm.load_u32(SB_NEXT_INODE_OFF)?;
    Ok(geo.inode_count.saturating_sub(next))
}
