use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::fileset::Fileset;
use crate::identity::FilesetIdentity;

/// Durable record the host keeps between operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub identity: FilesetIdentity,
    /// Relative path to hex SHA-256 of the file's contents.
    #[serde(default)]
    pub file_digests: BTreeMap<String, String>,
}

impl PersistedState {
    pub fn new(identity: FilesetIdentity, files: &Fileset) -> Self {
        Self {
            identity,
            file_digests: files.file_digests(),
        }
    }

    /// State established by an import: identity only, digests filled in by
    /// the next read.
    pub fn imported(identity: FilesetIdentity) -> Self {
        Self {
            identity,
            file_digests: BTreeMap::new(),
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, SyncError> {
        serde_json::from_str(payload)
            .map_err(|e| SyncError::HostProtocol(format!("prior state: {e}")))
    }
}
