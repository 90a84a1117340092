use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::SyncError;

/// Upper bound on object tags accepted by the store.
pub const MAX_TAGS: usize = 10;

/// A configuration value as seen by the host: not set, set but not yet known
/// (pending computation during planning), or known.
///
/// Only [`Attr::Value`] is ever forwarded to the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Attr<T> {
    #[default]
    Unset,
    Unknown,
    Value(T),
}

impl<T> Attr<T> {
    /// The value, if it is known.
    pub fn known(&self) -> Option<&T> {
        match self {
            Attr::Value(v) => Some(v),
            Attr::Unset | Attr::Unknown => None,
        }
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Attr::Value(v),
            None => Attr::Unset,
        }
    }
}

impl<T: Serialize> Serialize for Attr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.known().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Attr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Attr::from)
    }
}

/// Options applied to every uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOptions {
    #[serde(default)]
    pub cache_control: Attr<String>,
}

/// Desired configuration of one managed fileset.
///
/// `bucket`, `glob` and `prefix` are identity-defining: changing any of them
/// replaces the resource. Everything else is applied by an in-place update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesetConfiguration {
    pub bucket: String,
    pub glob: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_configuration: Option<FileOptions>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl FilesetConfiguration {
    pub fn new(bucket: impl Into<String>, glob: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            glob: glob.into(),
            prefix: None,
            file_configuration: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: Attr<String>) -> Self {
        self.file_configuration = Some(FileOptions { cache_control });
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Decodes a configuration payload handed over by the host.
    pub fn from_json(payload: &str) -> Result<Self, SyncError> {
        serde_json::from_str(payload)
            .map_err(|e| SyncError::HostProtocol(format!("desired configuration: {e}")))
    }

    /// The key prefix, with an unset prefix reading as empty.
    pub fn key_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// Cache directive to forward, if one is known.
    pub fn cache_control(&self) -> Option<&str> {
        self.file_configuration
            .as_ref()
            .and_then(|f| f.cache_control.known())
            .map(String::as_str)
    }

    /// Checks the constraints the host schema declares.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.bucket.trim().is_empty() {
            return Err(SyncError::InvalidConfiguration(
                "bucket must not be empty".into(),
            ));
        }
        if self.glob.trim().is_empty() {
            return Err(SyncError::InvalidConfiguration(
                "glob must not be empty".into(),
            ));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(SyncError::InvalidConfiguration(format!(
                "at most {MAX_TAGS} tags are allowed, got {}",
                self.tags.len()
            )));
        }
        Ok(())
    }

    /// True when `other` differs only in fields that update in place.
    pub fn same_identity_fields(&self, other: &Self) -> bool {
        self.bucket == other.bucket
            && self.glob == other.glob
            && self.key_prefix() == other.key_prefix()
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            glob = %self.glob,
            prefix = self.key_prefix(),
            tags_count = self.tags.len(),
            "Loaded fileset configuration"
        );
        debug!(?self, "Fileset configuration (full debug)");
    }
}
