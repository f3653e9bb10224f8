#![forbid(unsafe_code)]
//! Path normalization and resolution.
//!
//! Normalization is purely textual: split on `/`, drop empty components
//! and `.`, pop on `..` (popping at the root stays at the root). The empty
//! path normalizes to `/`.
//!
//! Resolution walks components from the root. A symlink encountered before
//! the final component (or at it, when following) splices its target into
//! the remaining path and restarts: absolute targets restart from the
//! root, relative targets are concatenated to the parent path resolved so
//! far. A fixed traversal budget bounds chains and cycles.
//!
//! The optional `PathCache` memoizes normalized-absolute-path to inode for
//! follow-resolutions only. It is per-attached-context: mutations made
//! through another context cannot invalidate it, so it is for
//! single-writer topologies and is disabled by default.

use parking_lot::RwLock;
use sfs_error::{Result, SfsError};
use sfs_ondisk::{Geometry, Inode};
use sfs_shm::SharedBuffer;
use sfs_types::{InodeNo, MAX_NAME_LEN, MAX_SYMLINK_DEPTH};
use std::collections::HashMap;

// ── Normalization ───────────────────────────────────────────────────────────

/// Collapse a path textually; the result is absolute and contains no `.`,
/// `..`, or empty components.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Operations accept absolute paths only.
pub fn ensure_absolute(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(SfsError::invalid("empty path"));
    }
    if !path.starts_with('/') {
        return Err(SfsError::invalid(format!("relative path: {path}")));
    }
    Ok(())
}

/// Components of a normalized path ( `/` yields none).
fn components(normalized: &str) -> Vec<&str> {
    normalized.split('/').filter(|c| !c.is_empty()).collect()
}

/// Parent path of a normalized path; `/` for top-level names.
#[must_use]
pub fn parent_of(normalized: &str) -> String {
    match normalized.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => normalized[..idx].to_owned(),
    }
}

/// Final component of a normalized path, if any.
#[must_use]
pub fn leaf_of(normalized: &str) -> Option<&str> {
    components(normalized).last().copied()
}

// ── Path cache ──────────────────────────────────────────────────────────────

/// Memoizes normalized absolute paths to inode numbers.
#[derive(Debug, Default)]
pub struct PathCache {
    map: RwLock<HashMap<String, InodeNo>>,
}

impl PathCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<InodeNo> {
        self.map.read().get(path).copied()
    }

    pub fn insert(&self, path: String, ino: InodeNo) {
        self.map.write().insert(path, ino);
    }

    /// Drop `prefix` itself and every cached path beneath it.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut map = self.map.write();
        if prefix == "/" {
            map.clear();
            return;
        }
        let subtree = format!("{prefix}/");
        map.retain(|path, _| path != prefix && !path.starts_with(&subtree));
    }

    pub fn clear(&self) {
        self.map.write().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// Resolve an absolute path to an inode.
///
/// With `follow_final` a symlink in the terminal position is traversed
/// like any intermediate one; without it the link inode itself is
/// returned.
pub fn resolve(
    shm: &SharedBuffer,
    geo: &Geometry,
    path: &str,
    follow_final: bool,
) -> Result<InodeNo> {
    resolve_with_cache(shm, geo, None, path, follow_final)
}

/// `resolve` with an optional per-context cache consulted for
/// follow-resolutions.
pub fn resolve_with_cache(
    shm: &SharedBuffer,
    geo: &Geometry,
    cache: Option<&PathCache>,
    path: &str,
    follow_final: bool,
) -> Result<InodeNo> {
    ensure_absolute(path)?;
    let original = normalize(path);

    if follow_final {
        if let Some(hit) = cache.and_then(|c| c.get(&original)) {
            return Ok(hit);
        }
    }

    let mut current = original.clone();
    let mut budget = MAX_SYMLINK_DEPTH;

    'restart: loop {
        let comps: Vec<String> = components(&current).iter().map(|c| (*c).to_owned()).collect();
        let mut cur = InodeNo::ROOT;

        for (idx, comp) in comps.iter().enumerate() {
            let cur_inode = sfs_inode::read_live_inode(shm, geo, cur, &current)?;
            if !cur_inode.is_dir() {
                return Err(SfsError::NotDirectory);
            }

            let Some((child, _)) = sfs_dir::lookup(shm, geo, &cur_inode, comp)? else {
                return Err(SfsError::not_found(current));
            };
            let child_inode = sfs_inode::read_inode(shm, geo, child)?;
            if child_inode.mode == 0 {
                return Err(SfsError::Corruption {
                    detail: format!("directory entry {comp} references released inode {child}"),
                });
            }

            let is_last = idx == comps.len() - 1;
            if child_inode.is_symlink() && (follow_final || !is_last) {
                if budget == 0 {
                    return Err(SfsError::Loop);
                }
                budget -= 1;

                let target = read_link_target(shm, geo, &child_inode)?;
                let remaining = comps[idx + 1..].join("/");
                current = if target.starts_with('/') {
                    normalize(&format!("{target}/{remaining}"))
                } else {
                    let parent = format!("/{}", comps[..idx].join("/"));
                    normalize(&format!("{parent}/{target}/{remaining}"))
                };
                continue 'restart;
            }

            cur = child;
        }

        if follow_final {
            if let Some(cache) = cache {
                cache.insert(original, cur);
            }
        }
        return Ok(cur);
    }
}

/// Read a symlink inode's target bytes.
pub fn read_link_target(shm: &SharedBuffer, geo: &Geometry, link: &Inode) -> Result<String> {
    let len = usize::try_from(link.size)
        .map_err(|_| SfsError::corruption("symlink target size overflows"))?;
    let mut bytes = vec![0_u8; len];
    let read = sfs_blockmap::read_at(shm, geo, link, 0, &mut bytes)?;
    if read != len {
        return Err(SfsError::corruption("symlink target shorter than its size"));
    }
    String::from_utf8(bytes).map_err(|_| SfsError::corruption("symlink target is not UTF-8"))
}

/// The parent directory and leaf name an entry operation works on.
#[derive(Debug, Clone)]
pub struct ParentRef {
    pub parent: InodeNo,
    pub name: String,
    /// Normalized path of the entry itself.
    pub path: String,
    /// Normalized path of the parent directory.
    pub parent_path: String,
}

/// Resolve the parent directory of `path` (following symlinks) and split
/// off the final name. The root has no parent.
pub fn resolve_parent(shm: &SharedBuffer, geo: &Geometry, path: &str) -> Result<ParentRef> {
    ensure_absolute(path)?;
    let normalized = normalize(path);
    let Some(name) = leaf_of(&normalized).map(str::to_owned) else {
        return Err(SfsError::invalid("operation on the root directory"));
    };
    if name.len() > MAX_NAME_LEN {
        return Err(SfsError::NameTooLong);
    }
    let parent_path = parent_of(&normalized);

    let parent = resolve(shm, geo, &parent_path, true)?;
    let parent_inode = sfs_inode::read_live_inode(shm, geo, parent, &parent_path)?;
    if !parent_inode.is_dir() {
        return Err(SfsError::NotDirectory);
    }

    Ok(ParentRef {
        parent,
        name,
        path: normalized,
        parent_path,
    })
}
