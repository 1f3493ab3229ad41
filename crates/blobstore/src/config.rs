//! Store configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `BLOBSTORE_ROOT`: Root directory of the store
//! - `BLOBSTORE_ALGORITHM`: Digest algorithm for new content (`sha256` or `blake3`)
//! - `BLOBSTORE_READONLY`: Set to "true" for read-only mode
//!
//! Default root: `~/.blobstore`

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::digest::{Algorithm, CONTENT_DIR, METADATA_DIR};

/// Configuration for a filesystem blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory. Content lives in `{root}/content/`, metadata in
    /// `{root}/metadata/`.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Algorithm used to address newly stored content.
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Read-only mode - no directories are created and every write fails.
    #[serde(default)]
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            algorithm: Algorithm::default(),
            read_only: false,
        }
    }
}

/// Get the default store root (~/.blobstore).
fn default_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".blobstore"))
        .unwrap_or_else(|| PathBuf::from(".blobstore"))
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_name(name.trim()).ok_or_else(|| anyhow!("unknown digest algorithm: {name}"))
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let root = env::var("BLOBSTORE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_root());

        let algorithm = match env::var("BLOBSTORE_ALGORITHM") {
            Ok(name) => parse_algorithm(&name).context("invalid BLOBSTORE_ALGORITHM")?,
            Err(_) => Algorithm::default(),
        };

        let read_only = env::var("BLOBSTORE_READONLY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            root,
            algorithm,
            read_only,
        })
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[store]` section:
    /// ```toml
    /// [store]
    /// root = "/var/lib/blobstore"
    /// algorithm = "sha256"
    /// read_only = false
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        match table.get("store") {
            Some(section) => section
                .clone()
                .try_into()
                .context("failed to parse [store] section"),
            None => Self::from_env(),
        }
    }

    /// Create a writable config rooted at a specific path.
    pub fn with_root(path: impl Into<PathBuf>) -> Self {
        Self {
            root: path.into(),
            algorithm: Algorithm::default(),
            read_only: false,
        }
    }

    /// Create a read-only config rooted at a specific path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            root: path.into(),
            algorithm: Algorithm::default(),
            read_only: true,
        }
    }

    /// Use a different algorithm for new content.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }
}
