//! FsStore: Filesystem-based content addressable blob store.
//!
//! Implements the StoreBackend trait on a local directory tree, partitioned
//! by algorithm and then by hex digest.
//!
//! Layout:
//! ```text
//! {root}/
//! ├── content/
//! │   └── sha256/
//! │       └── c3ab8ff1...        # Immutable blob, named by its digest
//! └── metadata/
//!     └── sha256/
//!         └── c3ab8ff1.../
//!             ├── parent         # One file per metadata key
//!             └── lastUpdated
//! ```
//!
//! There is no in-memory index: every call re-derives paths from the ID and
//! the filesystem is the only source of truth. All writes are
//! stage-then-rename (see [`crate::staging`]), so readers never observe a
//! partially written blob or metadata value.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::digest::{Algorithm, Id};
use crate::error::{IoContext, Result, StoreError};
use crate::metadata::MetadataKey;
use crate::staging::{is_staging_name, StagedFile};

/// Callback invoked once per stored ID by [`StoreBackend::walk`].
pub type WalkFn<'a> = dyn FnMut(&Id) -> Result<()> + 'a;

/// Trait for blob store backends.
///
/// Every backend honours the same contract:
/// - `set` is idempotent: identical bytes always yield the identical ID and
///   a single stored entry.
/// - `get` never returns bytes whose digest does not match the ID.
/// - Metadata can only be attached to content that is currently stored, and
///   is removed together with it by `delete`.
/// - `walk` visits every stored ID exactly once, in no particular order,
///   and stops at the first visitor error, returning it unchanged.
///
/// Malformed ID strings are rejected by [`Id::parse`] before a backend is
/// ever involved.
pub trait StoreBackend: Send + Sync {
    /// Store `data`, returning its ID.
    ///
    /// Fails with [`StoreError::EmptyContent`] for an empty payload.
    fn set(&self, data: &[u8]) -> Result<Id>;

    /// Read the bytes stored under `id`, verifying their digest.
    fn get(&self, id: &Id) -> Result<Vec<u8>>;

    /// Remove the content for `id` along with all of its metadata.
    ///
    /// Deleting an absent ID succeeds.
    fn delete(&self, id: &Id) -> Result<()>;

    /// Set (or overwrite) one metadata value for stored content.
    fn set_metadata(&self, id: &Id, key: &str, value: &[u8]) -> Result<()>;

    /// Read one metadata value.
    fn get_metadata(&self, id: &Id, key: &str) -> Result<Vec<u8>>;

    /// Visit every stored ID.
    fn walk(&self, visit: &mut WalkFn<'_>) -> Result<()>;
}

/// Filesystem-based blob store.
#[derive(Debug, Clone)]
pub struct FsStore {
    config: StoreConfig,
}

impl FsStore {
    /// Open a store with the given configuration.
    ///
    /// The root, `content` and `metadata` directories are created if missing
    /// (unless in read-only mode). Any of the three that exists but is not a
    /// directory fails with [`StoreError::InvalidRoot`]. Opening an existing
    /// store reuses its data.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let create = !config.read_only;
        ensure_dir(&config.root, create)?;
        ensure_dir(&config.content_dir(), create)?;
        ensure_dir(&config.metadata_dir(), create)?;

        debug!(
            "opened blob store at {} (algorithm {}, read_only {})",
            config.root.display(),
            config.algorithm,
            config.read_only
        );
        Ok(Self { config })
    }

    /// Open a writable store at a specific path.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::with_root(root))
    }

    /// Open a read-only store at a specific path.
    pub fn read_only_at(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::read_only(root))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Algorithm new content is addressed with.
    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    fn content_path(&self, id: &Id) -> PathBuf {
        self.config.root.join(id.content_path())
    }

    fn metadata_dir(&self, id: &Id) -> PathBuf {
        self.config.root.join(id.metadata_dir())
    }

    fn metadata_path(&self, id: &Id, key: &MetadataKey) -> PathBuf {
        self.config.root.join(id.metadata_path(key))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Whether a regular file is stored for `id`. Does not verify its digest.
    fn has_content(&self, id: &Id) -> Result<bool> {
        let path = self.content_path(id);
        match fs::symlink_metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e).io_context(|| format!("failed to stat {}", path.display())),
        }
    }

    fn walk_algorithm(&self, algorithm: Algorithm, dir: &Path, visit: &mut WalkFn<'_>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            // Removed while we were walking.
            Err(e) if is_absent(&e) => return Ok(()),
            Err(e) => return Err(e).io_context(|| format!("failed to list {}", dir.display())),
        };

        for entry in entries {
            let entry = entry.io_context(|| format!("failed to list {}", dir.display()))?;
            let name = entry.file_name();
            let Some(hex) = name.to_str() else {
                debug!("walk: skipping non-UTF-8 entry in {}", dir.display());
                continue;
            };
            let Ok(id) = Id::from_parts(algorithm, hex) else {
                if !is_staging_name(hex) {
                    debug!("walk: skipping malformed entry {}", entry.path().display());
                }
                continue;
            };
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                _ => {
                    debug!("walk: skipping non-file entry {}", entry.path().display());
                    continue;
                }
            }

            visit(&id)?;
        }
        Ok(())
    }
}

/// A lookup error meaning "nothing stored here": the entry is missing, or a
/// plain file sits where one of its parent directories should be.
fn is_absent(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

/// Make sure `path` is a directory, creating it (and its ancestors) when
/// absent and `create` is set.
fn ensure_dir(path: &Path, create: bool) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StoreError::InvalidRoot {
            path: path.to_path_buf(),
            reason: "exists but is not a directory".to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotADirectory => Err(StoreError::InvalidRoot {
            path: path.to_path_buf(),
            reason: "an ancestor is not a directory".to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if create {
                fs::create_dir_all(path)
                    .io_context(|| format!("failed to create directory {}", path.display()))?;
            }
            Ok(())
        }
        Err(e) => Err(e).io_context(|| format!("failed to stat {}", path.display())),
    }
}

impl StoreBackend for FsStore {
    fn set(&self, data: &[u8]) -> Result<Id> {
        let id = Id::compute(self.config.algorithm, data)?;
        self.ensure_writable()?;

        let path = self.content_path(&id);
        match fs::symlink_metadata(&path) {
            // Content-addressed: an existing file already holds these bytes.
            // Integrity is checked on read, not here.
            Ok(meta) if meta.is_file() => {
                debug!("content {} already stored", id);
                return Ok(id);
            }
            Ok(_) => {
                return Err(StoreError::corrupted(
                    &path,
                    "content path is occupied by a non-file",
                ))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) if e.kind() == ErrorKind::NotADirectory => {
                return Err(StoreError::corrupted(
                    &path,
                    "content directory is occupied by a non-directory",
                ))
            }
            Err(e) => return Err(e).io_context(|| format!("failed to stat {}", path.display())),
        }

        StagedFile::write_atomic(&path, data)?;
        debug!("stored content {} ({} bytes)", id, data.len());
        Ok(id)
    }

    fn get(&self, id: &Id) -> Result<Vec<u8>> {
        let path = self.content_path(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if is_absent(&e) => return Err(StoreError::NotFound(id.clone())),
            Err(_) if path.is_dir() => {
                return Err(StoreError::corrupted(
                    &path,
                    "content path is occupied by a directory",
                ))
            }
            Err(e) => return Err(e).io_context(|| format!("failed to read {}", path.display())),
        };

        if let Err(computed) = id.verify(&data) {
            warn!(
                "digest mismatch for {}: stored bytes hash to {}",
                id, computed
            );
            return Err(StoreError::corrupted(
                &path,
                format!("digest mismatch: expected {}, computed {}", id.hex(), computed),
            ));
        }
        Ok(data)
    }

    fn delete(&self, id: &Id) -> Result<()> {
        self.ensure_writable()?;

        let path = self.content_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if is_absent(&e) => {}
            Err(_) if path.is_dir() => {
                return Err(StoreError::corrupted(
                    &path,
                    "content path is occupied by a directory",
                ))
            }
            Err(e) => return Err(e).io_context(|| format!("failed to remove {}", path.display())),
        }

        let meta_dir = self.metadata_dir(id);
        match fs::remove_dir_all(&meta_dir) {
            Ok(()) => {}
            Err(e) if is_absent(&e) => {}
            Err(e) => {
                return Err(e).io_context(|| format!("failed to remove {}", meta_dir.display()))
            }
        }

        debug!("deleted {}", id);
        Ok(())
    }

    fn set_metadata(&self, id: &Id, key: &str, value: &[u8]) -> Result<()> {
        let key = MetadataKey::new(key)?;
        self.ensure_writable()?;

        if !self.has_content(id)? {
            return Err(StoreError::NotFound(id.clone()));
        }

        StagedFile::write_atomic(&self.metadata_path(id, &key), value)?;

        // A delete that ran between the check and the write would leave this
        // value behind, to resurface if the same bytes are stored again.
        if !self.has_content(id)? {
            let meta_dir = self.metadata_dir(id);
            match fs::remove_dir_all(&meta_dir) {
                Ok(()) => {}
                Err(e) if is_absent(&e) => {}
                Err(e) => {
                    return Err(e).io_context(|| format!("failed to remove {}", meta_dir.display()))
                }
            }
            debug!("discarded metadata {:?} for concurrently deleted {}", key.as_str(), id);
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn get_metadata(&self, id: &Id, key: &str) -> Result<Vec<u8>> {
        let key = MetadataKey::new(key)?;

        if !self.has_content(id)? {
            return Err(StoreError::NotFound(id.clone()));
        }

        let path = self.metadata_path(id, &key);
        match fs::read(&path) {
            Ok(value) => Ok(value),
            Err(e) if is_absent(&e) => Err(StoreError::MetadataNotFound {
                id: id.clone(),
                key: key.to_string(),
            }),
            Err(e) => Err(e).io_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn walk(&self, visit: &mut WalkFn<'_>) -> Result<()> {
        let content_dir = self.config.content_dir();
        let entries = match fs::read_dir(&content_dir) {
            Ok(entries) => entries,
            Err(e) if is_absent(&e) => return Ok(()),
            Err(e) => {
                return Err(e).io_context(|| format!("failed to list {}", content_dir.display()))
            }
        };

        for entry in entries {
            let entry = entry.io_context(|| format!("failed to list {}", content_dir.display()))?;
            let name = entry.file_name();
            let Some(algorithm) = name.to_str().and_then(Algorithm::from_name) else {
                debug!("walk: skipping unknown algorithm {}", entry.path().display());
                continue;
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                debug!("walk: skipping non-directory {}", entry.path().display());
                continue;
            }

            self.walk_algorithm(algorithm, &entry.path(), visit)?;
        }
        Ok(())
    }
}
