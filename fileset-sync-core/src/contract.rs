//! # contract: the object store boundary
//!
//! This module defines the single trait ([`ObjectStore`]) through which the
//! engine talks to remote storage, plus the plain request/response types
//! that cross it.
//!
//! ## Interface
//! - `put_object` writes one object with its metadata.
//! - `head_object` reports whether an object is currently readable. It is
//!   the primitive behind the post-write existence-confirmation poll.
//! - Backends map their own failures into [`StoreError`].
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so `MockObjectStore` is available
//!   in this crate's tests and, through the default `test-export-mocks`
//!   feature, in downstream crates.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub use crate::error::StoreError;

/// Everything needed to write one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    /// Only set when the configuration holds a known value.
    pub cache_control: Option<String>,
    /// Url-encoded tag set, absent when no tags are configured.
    pub tagging: Option<String>,
}

/// Result of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
}

/// Metadata returned by an existence check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub etag: Option<String>,
}

/// Remote object storage as seen by the engine.
///
/// The engine never overwrites, lists or deletes objects; it only writes new
/// ones and waits for them to become readable.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object.
    async fn put_object(&self, req: PutObjectRequest) -> Result<PutObjectOutput, StoreError>;

    /// Check whether an object is readable. Returns `Ok(None)` if it is not
    /// (yet) found.
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError>;
}
