//! S3 implementation of the core's [`ObjectStore`] contract.
//!
//! Works against AWS and S3-compatible endpoints (MinIO, LocalStack) through
//! `endpoint_url` plus path-style addressing.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};

use fileset_sync_core::contract::{ObjectMetadata, PutObjectOutput, PutObjectRequest};
use fileset_sync_core::{ObjectStore, StoreError};

use crate::load_config::StoreSection;

pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Builds a client from the default credential chain, overlaid with the
    /// harness's store settings.
    pub async fn from_settings(settings: &StoreSection) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        info!(
            region = ?settings.region,
            endpoint_url = ?settings.endpoint_url,
            force_path_style = settings.force_path_style,
            "Initialised S3 store"
        );
        Self {
            client: S3Client::from_conf(s3_config),
        }
    }
}

fn classify<E: ProvideErrorMetadata + std::fmt::Display>(
    err: &E,
    bucket: &str,
    key: &str,
    retryable: bool,
) -> StoreError {
    match err.code() {
        Some("AccessDenied") | Some("Forbidden") => StoreError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: err.to_string(),
        },
        Some("NoSuchBucket") => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Network {
            message: err.to_string(),
            retryable,
        },
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, req: PutObjectRequest) -> Result<PutObjectOutput, StoreError> {
        debug!(bucket = %req.bucket, key = %req.key, bytes = req.body.len(), "PutObject");

        let output = self
            .client
            .put_object()
            .bucket(&req.bucket)
            .key(&req.key)
            .body(ByteStream::from(req.body))
            .content_type(&req.content_type)
            .set_cache_control(req.cache_control)
            .set_tagging(req.tagging)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                classify(&service_err, &req.bucket, &req.key, true)
            })?;

        Ok(PutObjectOutput {
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: output.content_length().map(|l| l as u64).unwrap_or(0),
                content_type: output.content_type().map(str::to_string),
                cache_control: output.cache_control().map(str::to_string),
                etag: output.e_tag().map(str::to_string),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(classify(&service_err, bucket, key, false))
                }
            }
        }
    }
}
