//! Digest and ID layer.
//!
//! An [`Id`] is the string `<algorithm>:<hexdigest>`. It is computed from a
//! non-empty payload and maps deterministically onto the store layout:
//!
//! ```text
//! content/<algorithm>/<hexdigest>
//! metadata/<algorithm>/<hexdigest>/<key>
//! ```
//!
//! Nothing in this module touches the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::{Result, StoreError};
use crate::metadata::MetadataKey;

/// Name of the content subtree under the store root.
pub const CONTENT_DIR: &str = "content";

/// Name of the metadata subtree under the store root.
pub const METADATA_DIR: &str = "metadata";

const SEPARATOR: char = ':';

/// Hash functions a store can address content with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// SHA-256, the canonical algorithm.
    #[default]
    Sha256,
    /// Full 256-bit BLAKE3.
    Blake3,
}

impl Algorithm {
    /// Every supported algorithm, canonical first.
    pub const ALL: [Algorithm; 2] = [Algorithm::Sha256, Algorithm::Blake3];

    /// The algorithm every [`Id::from_data`] call uses.
    pub const CANONICAL: Algorithm = Algorithm::Sha256;

    /// Name used in IDs and as the directory name on disk.
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// Look up an algorithm by its exact name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name() == name)
    }

    /// Number of lowercase hex characters in a digest.
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Sha256 | Algorithm::Blake3 => 64,
        }
    }

    /// Hash `data` and return the lowercase hex digest.
    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            Algorithm::Sha256 => hex::encode(sha2::Sha256::digest(data)),
            Algorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated content identifier, `<algorithm>:<hexdigest>`.
///
/// Equality is exact string equality. Construction always validates, so an
/// `Id` in hand is known to be well formed (though not necessarily stored).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id {
    algorithm: Algorithm,
    repr: String,
}

impl Id {
    /// Compute the canonical (SHA-256) ID of `data`.
    ///
    /// Fails with [`StoreError::EmptyContent`] for an empty payload.
    pub fn from_data(data: &[u8]) -> Result<Self> {
        Self::compute(Algorithm::CANONICAL, data)
    }

    /// Compute the ID of `data` under a specific algorithm.
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(StoreError::EmptyContent);
        }
        let hex = algorithm.digest_hex(data);
        Ok(Self {
            algorithm,
            repr: format!("{}{SEPARATOR}{hex}", algorithm.name()),
        })
    }

    /// Parse and structurally validate an ID string.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason| StoreError::MalformedId {
            raw: raw.to_string(),
            reason,
        };

        let (name, hex) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| malformed("missing algorithm separator"))?;
        let algorithm = Algorithm::from_name(name).ok_or_else(|| malformed("unknown algorithm"))?;
        Self::from_parts(algorithm, hex)
    }

    /// Build an ID from an algorithm and a hex digest, validating the digest.
    pub fn from_parts(algorithm: Algorithm, hex: &str) -> Result<Self> {
        let repr = format!("{}{SEPARATOR}{hex}", algorithm.name());
        if hex.len() != algorithm.hex_len() || !is_lower_hex(hex) {
            return Err(StoreError::MalformedId {
                raw: repr,
                reason: hex_problem(algorithm, hex),
            });
        }
        Ok(Self { algorithm, repr })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex digest portion.
    pub fn hex(&self) -> &str {
        &self.repr[self.algorithm.name().len() + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    pub fn into_inner(self) -> String {
        self.repr
    }

    /// Recompute the digest of `data` with this ID's algorithm.
    ///
    /// Returns the computed hex on mismatch.
    pub fn verify(&self, data: &[u8]) -> std::result::Result<(), String> {
        let computed = self.algorithm.digest_hex(data);
        if computed == self.hex() {
            Ok(())
        } else {
            Err(computed)
        }
    }

    /// `content/<algorithm>/<hex>`, relative to the store root.
    pub fn content_path(&self) -> PathBuf {
        Path::new(CONTENT_DIR)
            .join(self.algorithm.name())
            .join(self.hex())
    }

    /// `metadata/<algorithm>/<hex>`, relative to the store root.
    pub fn metadata_dir(&self) -> PathBuf {
        Path::new(METADATA_DIR)
            .join(self.algorithm.name())
            .join(self.hex())
    }

    /// `metadata/<algorithm>/<hex>/<key>`, relative to the store root.
    pub fn metadata_path(&self, key: &MetadataKey) -> PathBuf {
        self.metadata_dir().join(key.as_str())
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn hex_problem(algorithm: Algorithm, hex: &str) -> &'static str {
    if hex.len() != algorithm.hex_len() {
        "wrong digest length"
    } else {
        "digest is not lowercase hex"
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl FromStr for Id {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Id {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.repr
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.repr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOOBAR_SHA256: &str =
        "sha256:c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2";

    #[test]
    fn test_from_data_known_vector() {
        let id = Id::from_data(b"foobar").unwrap();
        assert_eq!(id.as_str(), FOOBAR_SHA256);
        assert_eq!(id.algorithm(), Algorithm::Sha256);
        assert_eq!(
            id.hex(),
            "c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2"
        );
    }

    #[test]
    fn test_from_data_is_deterministic() {
        let a = Id::from_data(b"test data").unwrap();
        let b = Id::from_data(b"test data").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Id::from_data(b"other data").unwrap());
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(Id::from_data(b""), Err(StoreError::EmptyContent)));
        assert!(matches!(
            Id::compute(Algorithm::Blake3, &[]),
            Err(StoreError::EmptyContent)
        ));
    }

    #[test]
    fn test_blake3_ids() {
        let id = Id::compute(Algorithm::Blake3, b"foobar").unwrap();
        assert!(id.as_str().starts_with("blake3:"));
        assert_eq!(id.hex().len(), 64);
        assert_eq!(id.hex(), blake3::hash(b"foobar").to_hex().as_str());
        assert_ne!(id, Id::from_data(b"foobar").unwrap());
    }

    #[test]
    fn test_parse_valid() {
        let id: Id = FOOBAR_SHA256.parse().unwrap();
        assert_eq!(id, Id::from_data(b"foobar").unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let too_long = format!("{FOOBAR_SHA256}a");
        let upper = FOOBAR_SHA256.to_uppercase().replacen("SHA256", "sha256", 1);
        let non_hex = format!("sha256:{}", "g".repeat(64));
        let cases = [
            "foobar:abc",
            "sha256:abc",
            too_long.as_str(),
            &FOOBAR_SHA256[..FOOBAR_SHA256.len() - 1],
            "c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2",
            "sha256:c3ab:8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f",
            upper.as_str(),
            non_hex.as_str(),
            "",
        ];
        for raw in cases {
            let err = Id::parse(raw).unwrap_err();
            assert!(
                matches!(err, StoreError::MalformedId { .. }),
                "expected malformed id for {raw:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_error_reports_reason() {
        match Id::parse("md5:abc") {
            Err(StoreError::MalformedId { raw, reason }) => {
                assert_eq!(raw, "md5:abc");
                assert_eq!(reason, "unknown algorithm");
            }
            other => panic!("unexpected {other:?}"),
        }
        match Id::parse("sha256:abc") {
            Err(StoreError::MalformedId { reason, .. }) => assert_eq!(reason, "wrong digest length"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_paths() {
        let id = Id::from_data(b"foobar").unwrap();
        let key = MetadataKey::new("parent").unwrap();
        assert_eq!(
            id.content_path(),
            Path::new("content").join("sha256").join(id.hex())
        );
        assert_eq!(
            id.metadata_path(&key),
            Path::new("metadata").join("sha256").join(id.hex()).join("parent")
        );
    }

    #[test]
    fn test_verify() {
        let id = Id::from_data(b"foobar").unwrap();
        assert!(id.verify(b"foobar").is_ok());
        let computed = id.verify(b"foobar2").unwrap_err();
        assert_eq!(computed, Algorithm::Sha256.digest_hex(b"foobar2"));
    }

    #[test]
    fn test_algorithm_names() {
        for alg in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(alg.name()), Some(alg));
        }
        assert_eq!(Algorithm::from_name("SHA256"), None);
        assert_eq!(Algorithm::default(), Algorithm::CANONICAL);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = Id::from_data(b"serde test").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let restored: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn test_serde_rejects_malformed() {
        let result: std::result::Result<Id, _> = serde_json::from_str("\"sha256:abc\"");
        assert!(result.is_err());
    }
}
