#![forbid(unsafe_code)]
//! Error types for SwarmFS.
//!
//! Defines `SfsError` and a `Result<T>` alias used throughout the workspace.
//! Includes errno mappings for embedders that surface POSIX codes.

use thiserror::Error;

/// Unified error type for all SwarmFS operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("file exists")]
    Exists,

    #[error("is a directory")]
    IsDirectory,

    #[error("not a directory")]
    NotDirectory,

    #[error("no space left on filesystem")]
    NoSpace,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("too many levels of symbolic links")]
    Loop,

    #[error("directory not empty")]
    NotEmpty,

    #[error("name too long")]
    NameTooLong,

    #[error("bad file descriptor: {0}")]
    BadDescriptor(i32),

    #[error("bad filesystem magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("corrupt filesystem metadata: {detail}")]
    Corruption { detail: String },
}

impl SfsError {
    /// Shorthand for a `NotFound` carrying the offending path or name.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Shorthand for an `Invalid` with a reason.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    /// Shorthand for a `Corruption` with a detail message.
    #[must_use]
    pub fn corruption(detail: impl Into<String>) -> Self {
        Self::Corruption {
            detail: detail.into(),
        }
    }

    /// Convert this error into a POSIX errno.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::Exists => libc::EEXIST,
            Self::IsDirectory => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::NoSpace => libc::ENOSPC,
            Self::Invalid(_) => libc::EINVAL,
            Self::Loop => libc::ELOOP,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::BadDescriptor(_) => libc::EBADF,
            Self::BadMagic { .. } | Self::Corruption { .. } => libc::EIO,
        }
    }
}

/// Result alias using `SfsError`.
pub type Result<T> = std::result::Result<T, SfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_covers_the_taxonomy() {
        assert_eq!(SfsError::not_found("/x").to_errno(), libc::ENOENT);
        assert_eq!(SfsError::Exists.to_errno(), libc::EEXIST);
        assert_eq!(SfsError::IsDirectory.to_errno(), libc::EISDIR);
        assert_eq!(SfsError::NotDirectory.to_errno(), libc::ENOTDIR);
        assert_eq!(SfsError::NoSpace.to_errno(), libc::ENOSPC);
        assert_eq!(SfsError::invalid("x").to_errno(), libc::EINVAL);
        assert_eq!(SfsError::Loop.to_errno(), libc::ELOOP);
        assert_eq!(SfsError::NotEmpty.to_errno(), libc::ENOTEMPTY);
        assert_eq!(SfsError::NameTooLong.to_errno(), libc::ENAMETOOLONG);
        assert_eq!(SfsError::BadDescriptor(7).to_errno(), libc::EBADF);
        assert_eq!(
            SfsError::BadMagic {
                expected: 1,
                actual: 2
            }
            .to_errno(),
            libc::EIO
        );
        assert_eq!(SfsError::corruption("x").to_errno(), libc::EIO);
    }

    #[test]
    fn display_includes_detail() {
        let err = SfsError::not_found("/etc/hostname");
        assert_eq!(err.to_string(), "not found: /etc/hostname");

        let err = SfsError::BadMagic {
            expected: 0x3153_4653,
            actual: 0,
        };
        assert!(err.to_string().contains("0x31534653"));
    }
}
