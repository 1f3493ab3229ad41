use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::digest::Id;

/// Errors returned by store backends and the ID layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to store empty content")]
    EmptyContent,

    #[error("malformed id {raw:?}: {reason}")]
    MalformedId { raw: String, reason: &'static str },

    #[error("invalid metadata key {0:?}")]
    InvalidKey(String),

    #[error("content not found: {0}")]
    NotFound(Id),

    #[error("metadata {key:?} not found for {id}")]
    MetadataNotFound { id: Id, key: String },

    /// On-disk state contradicts the content-addressing invariant.
    #[error("store corrupted at {}: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("invalid store root {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("store is read-only")]
    ReadOnly,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Caller-supplied error, e.g. returned from a walk visitor.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// True for missing content and missing metadata alike.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::MetadataNotFound { .. }
        )
    }

    pub(crate) fn corrupted(path: &Path, reason: impl Into<String>) -> Self {
        StoreError::Corrupted {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Tag an I/O failure with what the store was doing.
pub(crate) trait IoContext<T> {
    fn io_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|source| StoreError::Io {
            context: f().into(),
            source,
        })
    }
}
