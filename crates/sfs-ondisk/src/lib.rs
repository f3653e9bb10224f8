#![forbid(unsafe_code)]
//! Byte-exact codecs for the on-buffer layout.
//!
//! Three fixed-layout records live in the shared buffer: the superblock
//! (one block at offset 0), 128-byte inode records in the inode table, and
//! 32-byte directory-entry slots inside directory data blocks. This crate
//! owns their encode/decode plus the `Geometry` that turns a buffer size
//! into region offsets.
//!
//! All integers are little-endian.

use serde::{Deserialize, Serialize};
use sfs_error::{Result, SfsError};
use sfs_shm::SharedBuffer;
use sfs_types::{
    BLOCK_SIZE, BlockNo, DIRENT_SIZE, DIRECT_BLOCKS, FREE_LIST_END, FileKind, INODE_COUNT_CAP,
    INODE_SIZE, InodeNo, MAX_NAME_LEN, SFS_MAGIC, SFS_VERSION, mode_is_dir, mode_is_file,
    mode_is_symlink,
};

// ── Superblock field offsets (bytes from buffer start) ──────────────────────

pub const SB_MAGIC_OFF: usize = 0;
pub const SB_VERSION_OFF: usize = 4;
pub const SB_BLOCK_SIZE_OFF: usize = 8;
pub const SB_TOTAL_BLOCKS_OFF: usize = 12;
pub const SB_INODE_COUNT_OFF: usize = 16;
/// Head of the intrusive free-block list; mutated only by CAS.
pub const SB_FREE_HEAD_OFF: usize = 20;
/// High-water mark of the inode bump allocator; mutated only by CAS.
pub const SB_NEXT_INODE_OFF: usize = 24;
pub const SB_ROOT_INODE_OFF: usize = 28;
pub const SB_DATA_BLOCKS_OFF: usize = 32;

// ── Inode record field offsets (bytes from record start) ────────────────────

const INO_MODE_OFF: usize = 0x00;
const INO_NLINK_OFF: usize = 0x04;
const INO_UID_OFF: usize = 0x08;
const INO_GID_OFF: usize = 0x0C;
const INO_SIZE_LO_OFF: usize = 0x10;
const INO_SIZE_HI_OFF: usize = 0x14;
const INO_ATIME_OFF: usize = 0x18;
const INO_MTIME_OFF: usize = 0x1C;
const INO_CTIME_OFF: usize = 0x20;
const INO_BLOCKS_OFF: usize = 0x24;
const INO_DIRECT_OFF: usize = 0x28;
const INO_INDIRECT_OFF: usize = 0x48;
const INO_DOUBLE_INDIRECT_OFF: usize = 0x4C;
const INO_FLAGS_OFF: usize = 0x50;

// ── Directory entry field offsets (bytes from slot start) ───────────────────

const DE_INODE_OFF: usize = 0;
const DE_NAME_LEN_OFF: usize = 4;
const DE_TYPE_OFF: usize = 6;
const DE_NAME_OFF: usize = 8;

// ── Geometry ────────────────────────────────────────────────────────────────

/// Region layout derived from the buffer size (format) or from stored
/// superblock fields (attach).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub total_blocks: u32,
    pub inode_count: u32,
    pub inode_table_blocks: u32,
    pub data_block_count: u32,
}

impl Geometry {
    /// Compute the layout for a fresh buffer of `len_bytes`.
    ///
    /// The inode count defaults to `total_blocks / 4` capped at 65536 and
    /// can be overridden; the data region must end up with at least two
    /// blocks (block 0 is reserved as the hole sentinel).
    pub fn for_new_buffer(len_bytes: usize, inode_count_override: Option<u32>) -> Result<Self> {
        let total_blocks = u32::try_from(len_bytes / BLOCK_SIZE)
            .map_err(|_| SfsError::invalid("buffer too large for 32-bit block numbers"))?;

        let default_count = (total_blocks / 4).min(INODE_COUNT_CAP);
        let inode_count = inode_count_override.unwrap_or(default_count);
        if inode_count < 2 {
            return Err(SfsError::invalid("inode count must be at least 2"));
        }

        let inode_table_blocks =
            u32::try_from((inode_count as usize * INODE_SIZE).div_ceil(BLOCK_SIZE))
                .map_err(|_| SfsError::invalid("inode table too large"))?;

        let metadata_blocks = 1 + inode_table_blocks;
        let data_block_count = total_blocks
            .checked_sub(metadata_blocks)
            .ok_or_else(|| SfsError::invalid("buffer too small for superblock and inode table"))?;
        if data_block_count < 2 {
            return Err(SfsError::invalid("buffer too small: no allocatable data blocks"));
        }

        Ok(Self {
            total_blocks,
            inode_count,
            inode_table_blocks,
            data_block_count,
        })
    }

    /// Recompute the layout from an already-validated superblock.
    pub fn from_superblock(sb: &Superblock) -> Result<Self> {
        let inode_table_blocks =
            u32::try_from((sb.inode_count as usize * INODE_SIZE).div_ceil(BLOCK_SIZE))
                .map_err(|_| SfsError::corruption("stored inode count overflows table size"))?;

        let expected_data = sb
            .total_blocks
            .checked_sub(1 + inode_table_blocks)
            .ok_or_else(|| SfsError::corruption("stored block counts are inconsistent"))?;
        if expected_data != sb.data_block_count {
            return Err(SfsError::corruption(format!(
                "stored data_block_count {} does not match computed {expected_data}",
                sb.data_block_count
            )));
        }

        Ok(Self {
            total_blocks: sb.total_blocks,
            inode_count: sb.inode_count,
            inode_table_blocks,
            data_block_count: sb.data_block_count,
        })
    }

    /// Byte offset of the inode table.
    #[must_use]
    pub fn inode_table_offset(&self) -> usize {
        BLOCK_SIZE
    }

    /// Byte offset of inode `ino`'s record.
    pub fn inode_offset(&self, ino: InodeNo) -> Result<usize> {
        if ino.0 >= self.inode_count {
            return Err(SfsError::Corruption {
                detail: format!("inode {ino} out of range (count {})", self.inode_count),
            });
        }
        Ok(self.inode_table_offset() + ino.0 as usize * INODE_SIZE)
    }

    /// Byte offset of the data region.
    #[must_use]
    pub fn data_region_offset(&self) -> usize {
        (1 + self.inode_table_blocks as usize) * BLOCK_SIZE
    }

    /// Byte offset of data block `block`.
    pub fn block_offset(&self, block: BlockNo) -> Result<usize> {
        if block.0 >= self.data_block_count {
            return Err(SfsError::Corruption {
                detail: format!(
                    "data block {block} out of range (count {})",
                    self.data_block_count
                ),
            });
        }
        Ok(self.data_region_offset() + block.0 as usize * BLOCK_SIZE)
    }

    /// Whether `block` is a valid data block number.
    #[must_use]
    pub fn contains_block(&self, block: u32) -> bool {
        block < self.data_block_count
    }

    /// Total buffer bytes this layout requires.
    #[must_use]
    pub fn required_len(&self) -> usize {
        self.total_blocks as usize * BLOCK_SIZE
    }
}

// ── Superblock ──────────────────────────────────────────────────────────────

/// Decoded snapshot of the superblock.
///
/// `free_block_head` and `next_free_inode` are live, CAS-mutated words;
/// a `Superblock` value is a point-in-time read of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_count: u32,
    pub free_block_head: u32,
    pub next_free_inode: u32,
    pub root_inode: u32,
    pub data_block_count: u32,
}

impl Superblock {
    /// The superblock written at format time for `geo`.
    #[must_use]
    pub fn for_geometry(geo: &Geometry) -> Self {
        Self {
            magic: SFS_MAGIC,
            version: SFS_VERSION,
            block_size: BLOCK_SIZE as u32,
            total_blocks: geo.total_blocks,
            inode_count: geo.inode_count,
            free_block_head: 1,
            next_free_inode: 1,
            root_inode: InodeNo::ROOT.0,
            data_block_count: geo.data_block_count,
        }
    }

    /// Read a snapshot from the buffer.
    pub fn read_from(shm: &SharedBuffer) -> Result<Self> {
        Ok(Self {
            magic: shm.load_u32(SB_MAGIC_OFF)?,
            version: shm.load_u32(SB_VERSION_OFF)?,
            block_size: shm.load_u32(SB_BLOCK_SIZE_OFF)?,
            total_blocks: shm.load_u32(SB_TOTAL_BLOCKS_OFF)?,
            inode_count: shm.load_u32(SB_INODE_COUNT_OFF)?,
            free_block_head: shm.load_u32(SB_FREE_HEAD_OFF)?,
            next_free_inode: shm.load_u32(SB_NEXT_INODE_OFF)?,
            root_inode: shm.load_u32(SB_ROOT_INODE_OFF)?,
            data_block_count: shm.load_u32(SB_DATA_BLOCKS_OFF)?,
        })
    }

    /// Write every field to the buffer.
    pub fn write_to(&self, shm: &SharedBuffer) -> Result<()> {
        shm.store_u32(SB_MAGIC_OFF, self.magic)?;
        shm.store_u32(SB_VERSION_OFF, self.version)?;
        shm.store_u32(SB_BLOCK_SIZE_OFF, self.block_size)?;
        shm.store_u32(SB_TOTAL_BLOCKS_OFF, self.total_blocks)?;
        shm.store_u32(SB_INODE_COUNT_OFF, self.inode_count)?;
        shm.store_u32(SB_FREE_HEAD_OFF, self.free_block_head)?;
        shm.store_u32(SB_NEXT_INODE_OFF, self.next_free_inode)?;
        shm.store_u32(SB_ROOT_INODE_OFF, self.root_inode)?;
        shm.store_u32(SB_DATA_BLOCKS_OFF, self.data_block_count)?;
        Ok(())
    }

    /// Validate an attach-time snapshot; a wrong magic is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.magic != SFS_MAGIC {
            return Err(SfsError::BadMagic {
                expected: SFS_MAGIC,
                actual: self.magic,
            });
        }
        if self.version != SFS_VERSION {
            return Err(SfsError::Corruption {
                detail: format!("unsupported layout version {}", self.version),
            });
        }
        if self.block_size != BLOCK_SIZE as u32 {
            return Err(SfsError::Corruption {
                detail: format!("unsupported block size {}", self.block_size),
            });
        }
        if self.root_inode != InodeNo::ROOT.0 {
            return Err(SfsError::Corruption {
                detail: format!("unexpected root inode {}", self.root_inode),
            });
        }
        Ok(())
    }
}

/// Probe whether a buffer carries the filesystem magic (cheap check before
/// a full attach).
#[must_use]
pub fn looks_formatted(shm: &SharedBuffer) -> bool {
    shm.load_u32(SB_MAGIC_OFF).is_ok_and(|m| m == SFS_MAGIC)
}

// ── Inode record ────────────────────────────────────────────────────────────

/// Decoded 128-byte inode record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    /// Count of data blocks reachable through the map (pointer blocks are
    /// not counted).
    pub blocks: u32,
    pub direct: [u32; DIRECT_BLOCKS],
    pub indirect: u32,
    pub double_indirect: u32,
    pub flags: u32,
}

impl Inode {
    /// A freshly created inode of the given mode.
    #[must_use]
    pub fn new(mode: u32, uid: u32, gid: u32, now: u32) -> Self {
        let nlink = if mode_is_dir(mode) { 2 } else { 1 };
        Self {
            mode,
            nlink,
            uid,
            gid,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            blocks: 0,
            direct: [0; DIRECT_BLOCKS],
            indirect: 0,
            double_indirect: 0,
            flags: 0,
        }
    }

    /// Decode a record from at least `INODE_SIZE` bytes.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < INODE_SIZE {
            return Err(SfsError::Corruption {
                detail: format!("inode record truncated to {} bytes", raw.len()),
            });
        }
        let u32_at = |off: usize| u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]);

        let mut direct = [0_u32; DIRECT_BLOCKS];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = u32_at(INO_DIRECT_OFF + i * 4);
        }

        Ok(Self {
            mode: u32_at(INO_MODE_OFF),
            nlink: u32_at(INO_NLINK_OFF),
            uid: u32_at(INO_UID_OFF),
            gid: u32_at(INO_GID_OFF),
            size: u64::from(u32_at(INO_SIZE_LO_OFF)) | (u64::from(u32_at(INO_SIZE_HI_OFF)) << 32),
            atime: u32_at(INO_ATIME_OFF),
            mtime: u32_at(INO_MTIME_OFF),
            ctime: u32_at(INO_CTIME_OFF),
            blocks: u32_at(INO_BLOCKS_OFF),
            direct,
            indirect: u32_at(INO_INDIRECT_OFF),
            double_indirect: u32_at(INO_DOUBLE_INDIRECT_OFF),
            flags: u32_at(INO_FLAGS_OFF),
        })
    }

    /// Encode into a fresh `INODE_SIZE`-byte record (reserved tail zeroed).
    #[must_use]
    pub fn encode(&self) -> [u8; INODE_SIZE] {
        let mut raw = [0_u8; INODE_SIZE];
        let mut put = |off: usize, v: u32| raw[off..off + 4].copy_from_slice(&v.to_le_bytes());

        put(INO_MODE_OFF, self.mode);
        put(INO_NLINK_OFF, self.nlink);
        put(INO_UID_OFF, self.uid);
        put(INO_GID_OFF, self.gid);
        #[expect(clippy::cast_possible_truncation)] // low half of the split
        put(INO_SIZE_LO_OFF, self.size as u32);
        #[expect(clippy::cast_possible_truncation)]
        put(INO_SIZE_HI_OFF, (self.size >> 32) as u32);
        put(INO_ATIME_OFF, self.atime);
        put(INO_MTIME_OFF, self.mtime);
        put(INO_CTIME_OFF, self.ctime);
        put(INO_BLOCKS_OFF, self.blocks);
        for (i, slot) in self.direct.iter().enumerate() {
            put(INO_DIRECT_OFF + i * 4, *slot);
        }
        put(INO_INDIRECT_OFF, self.indirect);
        put(INO_DOUBLE_INDIRECT_OFF, self.double_indirect);
        put(INO_FLAGS_OFF, self.flags);
        raw
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

    /// A slot that was used once and then released.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.mode == 0 && self.nlink == 0
    }

    #[must_use]
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }
}

// ── Directory entry ─────────────────────────────────────────────────────────

/// Decoded 32-byte directory-entry slot.
///
/// A slot with `ino == 0` is free. The root inode is never a directory
/// child, so the encoding is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDirent {
    pub ino: u32,
    pub name_len: u16,
    pub d_type: u16,
    pub name: [u8; MAX_NAME_LEN],
}

impl RawDirent {
    /// Decode a slot from at least `DIRENT_SIZE` bytes.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < DIRENT_SIZE {
            return Err(SfsError::Corruption {
                detail: format!("directory entry truncated to {} bytes", raw.len()),
            });
        }
        let ino = u32::from_le_bytes([
            raw[DE_INODE_OFF],
            raw[DE_INODE_OFF + 1],
            raw[DE_INODE_OFF + 2],
            raw[DE_INODE_OFF + 3],
        ]);
        let name_len = u16::from_le_bytes([raw[DE_NAME_LEN_OFF], raw[DE_NAME_LEN_OFF + 1]]);
        let d_type = u16::from_le_bytes([raw[DE_TYPE_OFF], raw[DE_TYPE_OFF + 1]]);
        let mut name = [0_u8; MAX_NAME_LEN];
        name.copy_from_slice(&raw[DE_NAME_OFF..DE_NAME_OFF + MAX_NAME_LEN]);
        Ok(Self {
            ino,
            name_len,
            d_type,
            name,
        })
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.ino == 0
    }

    /// The name bytes actually used by this entry.
    pub fn name_bytes(&self) -> Result<&[u8]> {
        let len = usize::from(self.name_len);
        if len > MAX_NAME_LEN {
            return Err(SfsError::Corruption {
                detail: format!("directory entry name_len {len} exceeds {MAX_NAME_LEN}"),
            });
        }
        Ok(&self.name[..len])
    }

    /// The entry name as UTF-8.
    pub fn name_str(&self) -> Result<&str> {
        std::str::from_utf8(self.name_bytes()?)
            .map_err(|_| SfsError::corruption("directory entry name is not UTF-8"))
    }
}

/// Encode a directory entry slot; names longer than `MAX_NAME_LEN` bytes
/// are rejected, shorter names are zero-padded.
pub fn encode_dirent(ino: InodeNo, d_type: u16, name: &str) -> Result<[u8; DIRENT_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(SfsError::invalid("empty directory entry name"));
    }
    if bytes.len() > MAX_NAME_LEN {
        return Err(SfsError::NameTooLong);
    }

    let mut raw = [0_u8; DIRENT_SIZE];
    raw[DE_INODE_OFF..DE_INODE_OFF + 4].copy_from_slice(&ino.0.to_le_bytes());
    #[expect(clippy::cast_possible_truncation)] // bounded by MAX_NAME_LEN above
    let name_len = bytes.len() as u16;
    raw[DE_NAME_LEN_OFF..DE_NAME_LEN_OFF + 2].copy_from_slice(&name_len.to_le_bytes());
    raw[DE_TYPE_OFF..DE_TYPE_OFF + 2].copy_from_slice(&d_type.to_le_bytes());
    raw[DE_NAME_OFF..DE_NAME_OFF + bytes.len()].copy_from_slice(bytes);
    Ok(raw)
}

/// Initial value threaded into a fresh free list: block `b` points at
/// `b + 1`, the last block carries the terminator.
#[must_use]
pub fn initial_free_list_next(block: u32, data_block_count: u32) -> u32 {
    if block + 1 < data_block_count {
        block + 1
    } else {
        FREE_LIST_END
    }
}
