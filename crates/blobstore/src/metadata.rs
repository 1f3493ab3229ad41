//! Metadata sidecar keys.
//!
//! Every stored object can carry any number of opaque metadata values, one
//! file per key under `metadata/<algorithm>/<hex>/`. Values are never
//! interpreted, so the only thing to validate is the key itself: it becomes
//! a file name and must not be able to escape its object's directory.

use std::fmt;

use crate::error::{Result, StoreError};

/// A metadata key that is safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey(String);

impl MetadataKey {
    /// Validate a key.
    ///
    /// Rejects empty keys, `.` and `..`, and anything containing a path
    /// separator or NUL.
    pub fn new(key: &str) -> Result<Self> {
        let unsafe_char = |c: char| c == '/' || c == '\\' || c == '\0';
        if key.is_empty() || key == "." || key == ".." || key.contains(unsafe_char) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MetadataKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_keys() {
        for key in ["parent", "lastUpdated", "tkey2", ".hidden", "a.b-c_d"] {
            assert_eq!(MetadataKey::new(key).unwrap().as_str(), key);
        }
    }

    #[test]
    fn test_rejects_path_escapes() {
        for key in ["", ".", "..", "a/b", "../x", "a\\b", "nul\0byte"] {
            assert!(
                matches!(MetadataKey::new(key), Err(StoreError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }
}
