#![forbid(unsafe_code)]
//! File-block to data-block mapping.
//!
//! Resolves a 0-based file-block index through the three-level scheme
//! (eight direct pointers, one indirect block, one double-indirect block),
//! allocates mappings on demand, and walks the structure to free blocks on
//! truncate. Pointer value 0 means "hole"; the layout reserves data block
//! 0 so the sentinel is unambiguous. Holes read as zeroes and writes into
//! holes allocate.
//!
//! On top of the map sit `read_at`/`write_at`, the byte-granular file I/O
//! every descriptor operation goes through.

use sfs_error::{Result, SfsError};
use sfs_ondisk::{Geometry, Inode};
use sfs_shm::SharedBuffer;
use sfs_types::{
    BLOCK_SIZE, BlockNo, DIRECT_BLOCKS, POINTERS_PER_BLOCK, blocks_covering, max_file_size,
};
use tracing::trace;

/// File-block indices covered by the direct tier.
const DIRECT_SPAN: u64 = DIRECT_BLOCKS as u64;
/// File-block indices covered by the indirect tier.
const INDIRECT_SPAN: u64 = POINTERS_PER_BLOCK as u64;
/// File-block indices covered by the double-indirect tier.
const DOUBLE_SPAN: u64 = (POINTERS_PER_BLOCK as u64) * (POINTERS_PER_BLOCK as u64);

// ── Pointer-slot helpers ────────────────────────────────────────────────────

/// Read pointer slot `index` of pointer block `block`.
fn load_slot(shm: &SharedBuffer, geo: &Geometry, block: BlockNo, index: usize) -> Result<u32> {
    shm.load_u32(geo.block_offset(block)? + index * 4)
}

/// Write pointer slot `index` of pointer block `block`.
fn store_slot(
    shm: &SharedBuffer,
    geo: &Geometry,
    block: BlockNo,
    index: usize,
    value: u32,
) -> Result<()> {
    shm.store_u32(geo.block_offset(block)? + index * 4, value)
}

/// Validate a stored pointer; 0 is a hole, anything else must land in the
/// data region.
fn decode_pointer(geo: &Geometry, raw: u32, what: &str) -> Result<Option<BlockNo>> {
    if raw == 0 {
        return Ok(None);
    }
    if !geo.contains_block(raw) {
        return Err(SfsError::Corruption {
            detail: format!("{what} pointer {raw} outside data region"),
        });
    }
    Ok(Some(BlockNo(raw)))
}

// ── Lookup ──────────────────────────────────────────────────────────────────

/// Resolve file-block index `fb` to a data block, or `None` for a hole.
pub fn map_file_block(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &Inode,
    fb: u64,
) -> Result<Option<BlockNo>> {
    if fb < DIRECT_SPAN {
        return decode_pointer(geo, inode.direct[fb as usize], "direct");
    }

    if fb < DIRECT_SPAN + INDIRECT_SPAN {
        let Some(ind) = decode_pointer(geo, inode.indirect, "indirect root")? else {
            return Ok(None);
        };
        let slot = (fb - DIRECT_SPAN) as usize;
        return decode_pointer(geo, load_slot(shm, geo, ind, slot)?, "indirect");
    }

    let i = fb - DIRECT_SPAN - INDIRECT_SPAN;
    if i >= DOUBLE_SPAN {
        return Err(SfsError::invalid("file block index beyond map capacity"));
    }
    let Some(dind) = decode_pointer(geo, inode.double_indirect, "double-indirect root")? else {
        return Ok(None);
    };
    let l1 = (i / INDIRECT_SPAN) as usize;
    let l2 = (i % INDIRECT_SPAN) as usize;
    let Some(l1_block) = decode_pointer(geo, load_slot(shm, geo, dind, l1)?, "double-indirect L1")?
    else {
        return Ok(None);
    };
    decode_pointer(geo, load_slot(shm, geo, l1_block, l2)?, "double-indirect L2")
}

// ── Allocation ──────────────────────────────────────────────────────────────

/// Resolve `fb`, allocating the data block (and any missing pointer
/// blocks) on demand.
///
/// On a mid-allocation failure every block allocated by this call is
/// returned to the free list and the map is left as it was found; a
/// half-installed pointer chain never survives.
pub fn ensure_file_block(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &mut Inode,
    fb: u64,
) -> Result<BlockNo> {
    if let Some(existing) = map_file_block(shm, geo, inode, fb)? {
        return Ok(existing);
    }

    if fb < DIRECT_SPAN {
        let block = sfs_alloc::alloc_block(shm, geo)?;
        inode.direct[fb as usize] = block.0;
        inode.blocks += 1;
        return Ok(block);
    }

    if fb < DIRECT_SPAN + INDIRECT_SPAN {
        return ensure_indirect(shm, geo, inode, (fb - DIRECT_SPAN) as usize);
    }

    let i = fb - DIRECT_SPAN - INDIRECT_SPAN;
    if i >= DOUBLE_SPAN {
        return Err(SfsError::invalid("file block index beyond map capacity"));
    }
    ensure_double_indirect(shm, geo, inode, (i / INDIRECT_SPAN) as usize, (i % INDIRECT_SPAN) as usize)
}

fn ensure_indirect(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &mut Inode,
    slot: usize,
) -> Result<BlockNo> {
    let mut new_root = None;
    let root = match decode_pointer(geo, inode.indirect, "indirect root")? {
        Some(existing) => existing,
        None => {
            let fresh = sfs_alloc::alloc_block(shm, geo)?;
            new_root = Some(fresh);
            fresh
        }
    };

    match sfs_alloc::alloc_block(shm, geo) {
        Ok(data) => {
            store_slot(shm, geo, root, slot, data.0)?;
            if let Some(fresh) = new_root {
                inode.indirect = fresh.0;
            }
            inode.blocks += 1;
            Ok(data)
        }
        Err(err) => {
            if let Some(fresh) = new_root {
                sfs_alloc::free_block(shm, geo, fresh)?;
            }
            Err(err)
        }
    }
}

fn ensure_double_indirect(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &mut Inode,
    l1: usize,
    l2: usize,
) -> Result<BlockNo> {
    let mut new_root = None;
    let root = match decode_pointer(geo, inode.double_indirect, "double-indirect root")? {
        Some(existing) => existing,
        None => match sfs_alloc::alloc_block(shm, geo) {
            Ok(fresh) => {
                new_root = Some(fresh);
                fresh
            }
            Err(err) => return Err(err),
        },
    };

    let mut new_l1 = None;
    let l1_block = match decode_pointer(geo, load_slot(shm, geo, root, l1)?, "double-indirect L1")? {
        Some(existing) => existing,
        None => match sfs_alloc::alloc_block(shm, geo) {
            Ok(fresh) => {
                new_l1 = Some(fresh);
                fresh
            }
            Err(err) => {
                if let Some(fresh) = new_root {
                    sfs_alloc::free_block(shm, geo, fresh)?;
                }
                return Err(err);
            }
        },
    };

    match sfs_alloc::alloc_block(shm, geo) {
        Ok(data) => {
            store_slot(shm, geo, l1_block, l2, data.0)?;
            if let Some(fresh) = new_l1 {
                store_slot(shm, geo, root, l1, fresh.0)?;
            }
            if let Some(fresh) = new_root {
                inode.double_indirect = fresh.0;
            }
            inode.blocks += 1;
            Ok(data)
        }
        Err(err) => {
            if let Some(fresh) = new_l1 {
                sfs_alloc::free_block(shm, geo, fresh)?;
            }
            if let Some(fresh) = new_root {
                sfs_alloc::free_block(shm, geo, fresh)?;
            }
            Err(err)
        }
    }
}

// ── Truncate / free ─────────────────────────────────────────────────────────

/// Cut the file back to `new_size` bytes.
///
/// Data blocks wholly beyond the new size are freed, pointer blocks that
/// become empty are freed with them, and the retained tail of the last
/// kept block is zeroed so later growth reads zeroes. Growing only moves
/// `size` (the new range is a hole).
///
/// Returns the number of blocks (data and pointer) returned to the free
/// list.
pub fn truncate_to(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &mut Inode,
    new_size: u64,
) -> Result<u32> {
    if new_size > max_file_size() {
        return Err(SfsError::invalid("size beyond map capacity"));
    }
    if new_size >= inode.size {
        inode.size = new_size;
        return Ok(0);
    }

    let keep = blocks_covering(new_size);
    let mut freed = 0_u32;

    // Direct tier.
    for fb in keep.min(DIRECT_SPAN)..DIRECT_SPAN {
        let slot = fb as usize;
        if let Some(block) = decode_pointer(geo, inode.direct[slot], "direct")? {
            sfs_alloc::free_block(shm, geo, block)?;
            inode.direct[slot] = 0;
            inode.blocks -= 1;
            freed += 1;
        }
    }

    // Indirect tier.
    if let Some(root) = decode_pointer(geo, inode.indirect, "indirect root")? {
        let tier_start = DIRECT_SPAN;
        let first_dropped = keep.saturating_sub(tier_start).min(INDIRECT_SPAN);
        freed += free_pointer_block_tail(shm, geo, inode, root, first_dropped as usize)?;
        if keep <= tier_start {
            sfs_alloc::free_block(shm, geo, root)?;
            inode.indirect = 0;
            freed += 1;
        }
    }

    // Double-indirect tier.
    if let Some(root) = decode_pointer(geo, inode.double_indirect, "double-indirect root")? {
        let tier_start = DIRECT_SPAN + INDIRECT_SPAN;
        for l1 in 0..POINTERS_PER_BLOCK {
            let l1_start = tier_start + l1 as u64 * INDIRECT_SPAN;
            if keep >= l1_start + INDIRECT_SPAN {
                continue;
            }
            let Some(l1_block) =
                decode_pointer(geo, load_slot(shm, geo, root, l1)?, "double-indirect L1")?
            else {
                continue;
            };
            let first_dropped = keep.saturating_sub(l1_start).min(INDIRECT_SPAN);
            freed += free_pointer_block_tail(shm, geo, inode, l1_block, first_dropped as usize)?;
            if keep <= l1_start {
                sfs_alloc::free_block(shm, geo, l1_block)?;
                store_slot(shm, geo, root, l1, 0)?;
                freed += 1;
            }
        }
        if keep <= tier_start {
            sfs_alloc::free_block(shm, geo, root)?;
            inode.double_indirect = 0;
            freed += 1;
        }
    }

    // Zero the retained tail of the last kept block so regrowth reads
    // zeroes.
    let tail = new_size % BLOCK_SIZE as u64;
    if tail != 0 {
        if let Some(last) = map_file_block(shm, geo, inode, keep - 1)? {
            let offset = geo.block_offset(last)? + tail as usize;
            shm.fill_zero(offset, BLOCK_SIZE - tail as usize)?;
        }
    }

    inode.size = new_size;
    trace!(target: "sfs::blockmap", event = "truncate", new_size, freed);
    Ok(freed)
}

/// Free the data pointers in `block` from slot `first_dropped` onward.
fn free_pointer_block_tail(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &mut Inode,
    block: BlockNo,
    first_dropped: usize,
) -> Result<u32> {
    let mut freed = 0_u32;
    for slot in first_dropped..POINTERS_PER_BLOCK {
        if let Some(data) = decode_pointer(geo, load_slot(shm, geo, block, slot)?, "data")? {
            sfs_alloc::free_block(shm, geo, data)?;
            store_slot(shm, geo, block, slot, 0)?;
            inode.blocks -= 1;
            freed += 1;
        }
    }
    Ok(freed)
}

/// Release every block the inode owns (data and pointer blocks alike).
pub fn free_all(shm: &SharedBuffer, geo: &Geometry, inode: &mut Inode) -> Result<u32> {
    truncate_to(shm, geo, inode, 0)
}

/// Every block the inode owns: data blocks plus the pointer blocks that
/// reach them. Consistency checks walk this to prove the free list and
/// the maps partition the data region.
pub fn owned_blocks(shm: &SharedBuffer, geo: &Geometry, inode: &Inode) -> Result<Vec<BlockNo>> {
    let mut owned = Vec::new();

    for slot in inode.direct {
        if let Some(block) = decode_pointer(geo, slot, "direct")? {
            owned.push(block);
        }
    }

    if let Some(root) = decode_pointer(geo, inode.indirect, "indirect root")? {
        owned.push(root);
        for slot in 0..POINTERS_PER_BLOCK {
            if let Some(block) = decode_pointer(geo, load_slot(shm, geo, root, slot)?, "indirect")? {
                owned.push(block);
            }
        }
    }

    if let Some(root) = decode_pointer(geo, inode.double_indirect, "double-indirect root")? {
        owned.push(root);
        for l1 in 0..POINTERS_PER_BLOCK {
            let Some(l1_block) =
                decode_pointer(geo, load_slot(shm, geo, root, l1)?, "double-indirect L1")?
            else {
                continue;
            };
            owned.push(l1_block);
            for l2 in 0..POINTERS_PER_BLOCK {
                if let Some(block) =
                    decode_pointer(geo, load_slot(shm, geo, l1_block, l2)?, "double-indirect L2")?
                {
                    owned.push(block);
                }
            }
        }
    }

    Ok(owned)
}

// ── Byte-granular I/O ───────────────────────────────────────────────────────

/// Read up to `out.len()` bytes at `offset`, clamped to the file size.
///
/// Holes yield zeroes. Returns the number of bytes read (0 at or past
/// end-of-file).
pub fn read_at(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &Inode,
    offset: u64,
    out: &mut [u8],
) -> Result<usize> {
    if offset >= inode.size || out.is_empty() {
        return Ok(0);
    }
    let len = out.len().min(usize::try_from(inode.size - offset).unwrap_or(usize::MAX));

    let mut done = 0;
    while done < len {
        let pos = offset + done as u64;
        let fb = pos / BLOCK_SIZE as u64;
        let in_block = (pos % BLOCK_SIZE as u64) as usize;
        let span = (BLOCK_SIZE - in_block).min(len - done);

        match map_file_block(shm, geo, inode, fb)? {
            Some(block) => {
                let from = geo.block_offset(block)? + in_block;
                shm.read_bytes(from, &mut out[done..done + span])?;
            }
            None => out[done..done + span].fill(0),
        }
        done += span;
    }
    Ok(done)
}

/// Write `data` at `offset`, allocating blocks on demand and extending the
/// file size.
///
/// When the free list runs dry mid-write the bytes already placed are
/// reported as a short count; a write that could not place a single byte
/// fails with `NoSpace`. The inode's `size`/`blocks` fields are updated in
/// place; the caller persists the record.
pub fn write_at(
    shm: &SharedBuffer,
    geo: &Geometry,
    inode: &mut Inode,
    offset: u64,
    data: &[u8],
) -> Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    let end = offset
        .checked_add(data.len() as u64)
        .ok_or_else(|| SfsError::invalid("write range overflows"))?;
    if end > max_file_size() {
        return Err(SfsError::invalid("write extends file beyond map capacity"));
    }

    let mut done = 0;
    while done < data.len() {
        let pos = offset + done as u64;
        let fb = pos / BLOCK_SIZE as u64;
        let in_block = (pos % BLOCK_SIZE as u64) as usize;
        let span = (BLOCK_SIZE - in_block).min(data.len() - done);

        let block = match ensure_file_block(shm, geo, inode, fb) {
            Ok(block) => block,
            Err(SfsError::NoSpace) if done > 0 => break,
            Err(err) => return Err(err),
        };
        let to = geo.block_offset(block)? + in_block;
        shm.write_bytes(to, &data[done..done + span])?;
        done += span;

        let reach = offset + done as u64;
        if reach > inode.size {
            inode.size = reach;
        }
    }
    Ok(done)
}
