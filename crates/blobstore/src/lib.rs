//! Content addressable blob store with metadata sidecars.
//!
//! Immutable blobs are stored under an ID derived from their own bytes,
//! `<algorithm>:<hexdigest>`, and can carry any number of mutable key/value
//! metadata entries. Deleting a blob deletes its metadata with it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use blobstore::{FsStore, Id, StoreBackend};
//!
//! let store = FsStore::open("/var/lib/blobstore")?;
//!
//! // Store content
//! let id = store.set(b"foobar")?;
//! assert_eq!(
//!     id.as_str(),
//!     "sha256:c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2"
//! );
//!
//! // Retrieve it (the digest is re-checked on every read)
//! let data = store.get(&id)?;
//!
//! // Attach metadata
//! store.set_metadata(&id, "parent", b"sha256:...")?;
//!
//! // Enumerate everything stored
//! store.walk(&mut |id: &Id| {
//!     println!("{id}");
//!     Ok(())
//! })?;
//! # Ok::<(), blobstore::StoreError>(())
//! ```
//!
//! # Configuration
//!
//! [`StoreConfig::from_env`] reads `BLOBSTORE_ROOT`, `BLOBSTORE_ALGORITHM`
//! and `BLOBSTORE_READONLY`; [`StoreConfig::from_file`] reads a `[store]`
//! table from TOML.
//!
//! # Concurrency
//!
//! There is no lock manager. Content is write-once and every write is
//! stage-then-rename, so concurrent writers of the same bytes converge on the
//! same file and concurrent metadata writers resolve last-write-wins.

pub mod config;
pub mod digest;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod staging;
pub mod store;

// Re-exports for convenience
pub use config::StoreConfig;
pub use digest::{Algorithm, Id};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use metadata::MetadataKey;
pub use store::{FsStore, StoreBackend, WalkFn};
