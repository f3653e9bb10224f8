#![forbid(unsafe_code)]
//! The SwarmFS operation surface.
//!
//! A [`Filesystem`] is one execution context's handle onto the shared
//! buffer: it owns the buffer reference, the derived geometry, a
//! per-context descriptor table, an optional path cache, and a clock.
//! Contexts share nothing else; `format` builds the layout in a fresh
//! buffer, `attach` joins an existing one after validating its magic.
//!
//! Every operation takes `&self`: the synchronization lives in the data
//! (CAS-mutated superblock words, per-context locks), not in the handle.

mod check;
mod clock;
mod fd;
mod ops;
mod surface;

pub use check::CheckReport;
pub use clock::{Clock, ManualClock, SystemClock};
pub use ops::NO_CHANGE;
pub use sfs_error::{Result, SfsError};
pub use sfs_shm::SharedBuffer;
pub use sfs_types::{BlockNo, FileKind, InodeNo};
pub use surface::{DirEntryInfo, FileStat, FsOptions, FsStats, OpenFlags, Whence};

use fd::FdTable;
use parking_lot::Mutex;
use sfs_ondisk::{Geometry, Inode, Superblock};
use sfs_path::PathCache;
use sfs_types::{S_IFDIR, mode_is_dir};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// One context's handle onto a shared-buffer filesystem.
pub struct Filesystem {
    shm: Arc<SharedBuffer>,
    geo: Geometry,
    fds: Mutex<FdTable>,
    cache: Option<PathCache>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("geo", &self.geo)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Filesystem {
    /// Create a fresh filesystem in a newly allocated shared buffer.
    pub fn initialize(buffer_bytes: usize, options: FsOptions) -> Result<Self> {
        let shm = SharedBuffer::allocate(buffer_bytes);
        Self::format(shm, options)
    }

    /// Write a fresh layout into `shm` and return an attached handle.
    pub fn format(shm: Arc<SharedBuffer>, options: FsOptions) -> Result<Self> {
        let geo = Geometry::for_new_buffer(shm.len(), options.inode_count)?;

        Superblock::for_geometry(&geo).write_to(&shm)?;
        sfs_alloc::thread_free_list(&shm, &geo)?;

        let fs = Self::assemble(shm, geo, &options);
        let root = Inode::new(S_IFDIR | 0o755, 0, 0, fs.now());
        sfs_inode::write_inode(&fs.shm, &fs.geo, InodeNo::ROOT, &root)?;

        info!(
            target: "sfs::ops",
            event = "format",
            total_blocks = geo.total_blocks,
            data_blocks = geo.data_block_count,
            inodes = geo.inode_count
        );
        Ok(fs)
    }

    /// Attach this context to an already-formatted buffer.
    pub fn attach(shm: Arc<SharedBuffer>) -> Result<Self> {
        Self::attach_with(shm, FsOptions::default())
    }

    /// `attach` with explicit options.
    pub fn attach_with(shm: Arc<SharedBuffer>, options: FsOptions) -> Result<Self> {
        let sb = Superblock::read_from(&shm)?;
        sb.validate()?;
        let geo = Geometry::from_superblock(&sb)?;
        if shm.len() < geo.required_len() {
            return Err(SfsError::Corruption {
                detail: format!(
                    "buffer of {} bytes shorter than the {} the layout describes",
                    shm.len(),
                    geo.required_len()
                ),
            });
        }
        debug!(
            target: "sfs::ops",
            event = "attach",
            total_blocks = geo.total_blocks,
            inodes = geo.inode_count
        );
        Ok(Self::assemble(shm, geo, &options))
    }

    fn assemble(shm: Arc<SharedBuffer>, geo: Geometry, options: &FsOptions) -> Self {
        Self {
            shm,
            geo,
            fds: Mutex::new(FdTable::new()),
            cache: options.path_cache.then(PathCache::new),
            clock: Arc::new(SystemClock),
        }
    }

    /// Swap the wall clock (tests drive time explicitly).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying shared buffer, for handing to further contexts.
    #[must_use]
    pub fn buffer(&self) -> Arc<SharedBuffer> {
        Arc::clone(&self.shm)
    }

    /// Whether `shm` carries the filesystem magic (cheap probe before a
    /// full attach).
    #[must_use]
    pub fn looks_formatted(shm: &SharedBuffer) -> bool {
        sfs_ondisk::looks_formatted(shm)
    }

    // ── Shared internals for the operation modules ─────────────────────

    pub(crate) fn now(&self) -> u32 {
        self.clock.now_secs()
    }

    pub(crate) fn read_live(&self, ino: InodeNo, what: &str) -> Result<Inode> {
        sfs_inode::read_live_inode(&self.shm, &self.geo, ino, what)
    }

    pub(crate) fn persist(&self, ino: InodeNo, inode: &Inode) -> Result<()> {
        sfs_inode::write_inode(&self.shm, &self.geo, ino, inode)
    }

    pub(crate) fn resolve(&self, path: &str, follow_final: bool) -> Result<InodeNo> {
        sfs_path::resolve_with_cache(&self.shm, &self.geo, self.cache.as_ref(), path, follow_final)
    }

    pub(crate) fn resolve_parent(&self, path: &str) -> Result<sfs_path::ParentRef> {
        sfs_path::resolve_parent(&self.shm, &self.geo, path)
    }

    /// Drop cached resolutions under the parent that just changed.
    pub(crate) fn invalidate_namespace(&self, parent_path: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_prefix(parent_path);
        }
    }

    pub(crate) fn expect_dir(inode: &Inode) -> Result<()> {
        if !mode_is_dir(inode.mode) {
            return Err(SfsError::NotDirectory);
        }
        Ok(())
    }
}
