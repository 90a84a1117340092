//! Stable resource identity derived from the identity-defining fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::FilesetConfiguration;
use crate::fileset::ContentDigest;

const IDENTITY_DOMAIN: &[u8] = b"fileset-identity";

/// Opaque identity of a managed fileset.
///
/// Derived from bucket, glob and prefix only. File contents, tags and file
/// options never influence it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilesetIdentity(String);

impl FilesetIdentity {
    pub fn derive(bucket: &str, glob: &str, prefix: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(IDENTITY_DOMAIN);
        hasher.update([0u8]);
        for field in [bucket, glob, prefix] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        Self(ContentDigest::from(hasher).to_hex())
    }

    pub fn of(config: &FilesetConfiguration) -> Self {
        Self::derive(&config.bucket, &config.glob, config.key_prefix())
    }

    /// Wraps an identity supplied from outside, e.g. by an import.
    pub fn from_external(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilesetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
