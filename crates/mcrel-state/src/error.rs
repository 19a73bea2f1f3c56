//! Error types for deep-merge operations.

use crate::{Key, Path};
use thiserror::Error;

/// Result type alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur while merging a patch into a state tree.
///
/// None of these are transient: retrying the same patch against the same
/// state fails the same way. The caller has to fix the patch.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The merge target is not a record.
    #[error("merge target must be a record, but got: {found}")]
    InvalidTarget {
        /// Kind of the value passed as target.
        found: &'static str,
    },

    /// The merge source is not a record.
    #[error("merge source must be a record, but got: {found}")]
    InvalidSource {
        /// Kind of the value passed as source.
        found: &'static str,
    },

    /// Nesting went past the configured depth limit.
    #[error("circular reference suspected: nesting exceeded {limit} levels at {path}")]
    Circular {
        /// Where the limit was hit.
        path: Path,
        /// The configured maximum depth.
        limit: usize,
    },

    /// A pierce named a key that is not in the target list or map.
    #[error("pierce error: item with key {key} not found at {path}")]
    PierceWrongKey {
        /// The pierced field.
        path: Path,
        /// The missing key.
        key: Key,
    },

    /// A pierce was aimed at something other than a list or map.
    #[error("target {found} at {path} can't be pierced")]
    PierceWrongTarget {
        /// The pierced field.
        path: Path,
        /// Kind of the value found there, or "absent".
        found: &'static str,
    },
}

impl MergeError {
    #[inline]
    pub fn invalid_target(found: &'static str) -> Self {
        MergeError::InvalidTarget { found }
    }

    #[inline]
    pub fn invalid_source(found: &'static str) -> Self {
        MergeError::InvalidSource { found }
    }

    #[inline]
    pub fn circular(path: Path, limit: usize) -> Self {
        MergeError::Circular { path, limit }
    }

    #[inline]
    pub fn pierce_wrong_key(path: Path, key: Key) -> Self {
        MergeError::PierceWrongKey { path, key }
    }

    #[inline]
    pub fn pierce_wrong_target(path: Path, found: &'static str) -> Self {
        MergeError::PierceWrongTarget { path, found }
    }

    /// Location of the failure inside the tree, if the error has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            MergeError::Circular { path, .. }
            | MergeError::PierceWrongKey { path, .. }
            | MergeError::PierceWrongTarget { path, .. } => Some(path),
            MergeError::InvalidTarget { .. } | MergeError::InvalidSource { .. } => None,
        }
    }
}
