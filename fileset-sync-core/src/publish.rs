//! Upload orchestration: write every file of a fileset to the store, one at a
//! time, and wait until each object is readable before moving on.

use std::path::Path;
use std::time::Duration;

use mime_guess::mime;
use tokio::time::Instant;
use tracing::{debug, error, info};
use url::form_urlencoded;

use crate::config::FilesetConfiguration;
use crate::context::OperationContext;
use crate::contract::{ObjectStore, PutObjectRequest};
use crate::error::SyncError;
use crate::fileset::{Fileset, MatchedFile};

/// Content type used when the extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Backoff schedule for the post-write existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Total time to wait for one object before giving up.
    pub ceiling: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ceiling: Duration::from_secs(5 * 60),
        }
    }
}

impl ConfirmationPolicy {
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }
}

/// Outcome of one file's upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub path: String,
    pub key: String,
    pub content_type: String,
    pub etag: Option<String>,
    /// Number of existence checks it took to see the object.
    pub confirmation_attempts: u32,
}

/// Object key for a matched path: the path itself, or `prefix/path`.
pub fn object_key(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}/{path}")
    }
}

/// Media type inferred from the file extension.
pub fn content_type_for(path: &str) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if let Some("js" | "mjs") = ext.as_deref() {
        return "application/javascript".to_string();
    }

    mime_guess::from_path(path)
        .first()
        .map(|guess| {
            if guess.type_() == mime::TEXT && guess.get_param(mime::CHARSET).is_none() {
                format!("{}; charset=utf-8", guess.essence_str())
            } else {
                guess.to_string()
            }
        })
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Url-encoded tag set, or `None` when there are no tags.
pub fn tagging_query<'a, I>(tags: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in tags {
        serializer.append_pair(key, value);
        any = true;
    }
    any.then(|| serializer.finish())
}

/// Publishes filesets to an [`ObjectStore`].
pub struct Publisher<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    policy: ConfirmationPolicy,
}

impl<'a, S: ObjectStore + ?Sized> Publisher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            policy: ConfirmationPolicy::default(),
        }
    }

    pub fn with_confirmation_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Uploads every file in path order. The first failure aborts the run;
    /// objects already written stay in place.
    pub async fn publish(
        &self,
        files: &Fileset,
        config: &FilesetConfiguration,
        ctx: &OperationContext,
    ) -> Result<Vec<UploadRecord>, SyncError> {
        let tagging = tagging_query(&config.tags);
        let cache_control = config.cache_control().map(str::to_string);

        info!(
            bucket = %config.bucket,
            prefix = config.key_prefix(),
            files = files.len(),
            tagged = tagging.is_some(),
            "[PUBLISH] Uploading fileset"
        );

        let mut records = Vec::with_capacity(files.len());
        for file in files.iter() {
            let record = self
                .publish_one(file, config, cache_control.clone(), tagging.clone(), ctx)
                .await
                .map_err(|e| {
                    error!(path = %file.path, error = %e, "[PUBLISH] Upload failed, aborting");
                    e
                })?;
            records.push(record);
        }

        info!(bucket = %config.bucket, uploaded = records.len(), "[PUBLISH] Fileset uploaded");
        Ok(records)
    }

    async fn publish_one(
        &self,
        file: &MatchedFile,
        config: &FilesetConfiguration,
        cache_control: Option<String>,
        tagging: Option<String>,
        ctx: &OperationContext,
    ) -> Result<UploadRecord, SyncError> {
        let key = object_key(config.key_prefix(), &file.path);
        let content_type = content_type_for(&file.path);
        debug!(path = %file.path, key = %key, content_type = %content_type, "[PUBLISH] Writing object");

        let request = PutObjectRequest {
            bucket: config.bucket.clone(),
            key: key.clone(),
            body: file.bytes.clone(),
            content_type: content_type.clone(),
            cache_control,
            tagging,
        };
        let output = ctx
            .guard(self.store.put_object(request))
            .await?
            .map_err(|source| SyncError::Publish {
                key: key.clone(),
                source,
            })?;

        let confirmation_attempts = self.await_object(&config.bucket, &key, ctx).await?;
        debug!(key = %key, attempts = confirmation_attempts, "[PUBLISH] Object confirmed");

        Ok(UploadRecord {
            path: file.path.clone(),
            key,
            content_type,
            etag: output.etag,
            confirmation_attempts,
        })
    }

    /// Polls until the object is readable or the ceiling elapses.
    async fn await_object(
        &self,
        bucket: &str,
        key: &str,
        ctx: &OperationContext,
    ) -> Result<u32, SyncError> {
        let started = Instant::now();
        let give_up_at = started + self.policy.ceiling;
        let mut delay = self.policy.initial_delay;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let found = ctx
                .guard(self.store.head_object(bucket, key))
                .await?
                .map_err(|source| SyncError::Publish {
                    key: key.to_string(),
                    source,
                })?;
            if found.is_some() {
                return Ok(attempts);
            }

            let now = Instant::now();
            if now >= give_up_at {
                return Err(SyncError::ConfirmationTimeout {
                    key: key.to_string(),
                    waited: now - started,
                });
            }
            let wait = delay.min(give_up_at - now);
            debug!(key, attempts, wait_ms = wait.as_millis() as u64, "[PUBLISH] Object not yet readable");
            ctx.guard(tokio::time::sleep(wait)).await?;
            delay = (delay * 2).min(self.policy.max_delay);
        }
    }
}
