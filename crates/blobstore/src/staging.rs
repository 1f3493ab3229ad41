//! Staging: stage-then-move writes.
//!
//! Every write into the store goes through a [`StagedFile`]. The bytes are
//! written to a uniquely named temp file in the destination's own directory,
//! synced, then renamed over the destination. Readers either see the old
//! file, the complete new one, or nothing; never a partial write.
//!
//! ```text
//! content/sha256/
//! ├── c3ab8ff1...           # committed content
//! └── .staging-5f0c...      # in-flight (or crash leftover)
//! ```
//!
//! Staging names never parse as digests, so leftovers are ignored by walks.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::{IoContext, Result, StoreError};

const STAGING_PREFIX: &str = ".staging-";

/// A temp file that becomes visible only when committed.
///
/// Dropping an uncommitted `StagedFile` removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

impl StagedFile {
    /// Create a staging file next to `dest`, creating `dest`'s parent
    /// directories if needed.
    pub fn create_for(dest: &Path) -> Result<Self> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        match fs::create_dir_all(dir) {
            Ok(()) => {}
            // Some component of `dir` is a plain file.
            Err(e) if matches!(e.kind(), ErrorKind::NotADirectory | ErrorKind::AlreadyExists) => {
                return Err(StoreError::corrupted(
                    dir,
                    "directory path is occupied by a non-directory",
                ))
            }
            Err(e) => {
                return Err(e).io_context(|| format!("failed to create directory {}", dir.display()))
            }
        }

        let path = dir.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()));
        let file = File::create_new(&path)
            .io_context(|| format!("failed to create staging file {}", path.display()))?;

        Ok(Self {
            path,
            file: Some(file),
            bytes_written: 0,
        })
    }

    /// Path of the temp file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append data to the staging file.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let path = &self.path;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("staging file already closed"))
            .io_context(|| format!("failed to write {}", path.display()))?;
        file.write_all(data)
            .io_context(|| format!("failed to write {}", path.display()))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Sync the data to disk, atomically rename it onto `dest`, then sync
    /// `dest`'s directory so the new entry survives a crash.
    ///
    /// An existing regular file at `dest` is replaced.
    pub fn commit(mut self, dest: &Path) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .io_context(|| format!("failed to sync {}", self.path.display()))?;
        }
        fs::rename(&self.path, dest).io_context(|| {
            format!(
                "failed to move {} into place at {}",
                self.path.display(),
                dest.display()
            )
        })?;
        // Renamed away; nothing left for Drop to clean up.
        self.path = PathBuf::new();

        if let Some(dir) = dest.parent() {
            sync_dir(dir)?;
        }
        Ok(())
    }

    /// Write `data` to `dest` via a staging file.
    pub fn write_atomic(dest: &Path, data: &[u8]) -> Result<()> {
        let mut staged = Self::create_for(dest)?;
        staged.write(data)?;
        staged.commit(dest)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.file = None;
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("failed to remove staging file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Flush a directory's entries to disk.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .io_context(|| format!("failed to sync directory {}", dir.display()))
}

/// Directories cannot be opened for syncing here; rename is the best we get.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Whether a directory entry name belongs to an in-flight staging file.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parents() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("a").join("b").join("blob");

        StagedFile::write_atomic(&dest, b"hello")?;

        assert_eq!(fs::read(&dest).unwrap(), b"hello");
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_staging_name(&e.file_name().to_string_lossy()))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_commit_replaces_existing_file() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("value");

        StagedFile::write_atomic(&dest, b"first")?;
        StagedFile::write_atomic(&dest, b"second")?;

        assert_eq!(fs::read(&dest).unwrap(), b"second");
        Ok(())
    }

    #[test]
    fn test_uncommitted_file_is_removed_on_drop() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("value");

        let mut staged = StagedFile::create_for(&dest)?;
        staged.write(b"Hello, ")?;
        staged.write(b"World!")?;
        assert_eq!(staged.bytes_written(), 13);

        let staging_path = staged.path().to_path_buf();
        assert!(staging_path.exists());
        assert!(!dest.exists(), "nothing visible before commit");

        drop(staged);
        assert!(!staging_path.exists());
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn test_commit_syncs_destination_directory() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("shard").join("value");

        StagedFile::write_atomic(&dest, b"durable")?;

        sync_dir(dest.parent().unwrap())?;
        assert_eq!(fs::read(&dest).unwrap(), b"durable");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir_reports_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("gone");
        assert!(matches!(sync_dir(&missing), Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_create_for_under_file_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("shard");
        fs::write(&blocker, b"not a directory").unwrap();

        let dest = blocker.join("value");
        assert!(matches!(
            StagedFile::create_for(&dest),
            Err(StoreError::Corrupted { .. })
        ));
        assert_eq!(fs::read(&blocker).unwrap(), b"not a directory");
    }

    #[test]
    fn test_staging_names_are_unique() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("value");

        let a = StagedFile::create_for(&dest)?;
        let b = StagedFile::create_for(&dest)?;
        assert_ne!(a.path(), b.path());
        assert!(is_staging_name(
            &a.path().file_name().unwrap().to_string_lossy()
        ));
        Ok(())
    }

    #[test]
    fn test_commit_onto_directory_fails_and_cleans_up() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("occupied");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("inner"), b"x").unwrap();

        let mut staged = StagedFile::create_for(&dest)?;
        staged.write(b"data")?;
        let staging_path = staged.path().to_path_buf();

        assert!(staged.commit(&dest).is_err());
        assert!(!staging_path.exists());
        assert!(dest.is_dir());
        Ok(())
    }
}
