//! S3-compatible implementation of the BlobStore trait

use crate::{BlobError, BlobObject, BlobResult, BlobStore};
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::time::Duration;

/// Connection settings for an S3-compatible store
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (MinIO, R2, Supabase storage). `None` uses AWS.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Lifetime of presigned download URLs
    pub presign_ttl: Duration,
}

impl S3Config {
    /// Load configuration from `BLOB_ENDPOINT`, `BLOB_REGION` and
    /// `BLOB_PRESIGN_TTL_SECS`
    pub fn from_env() -> Result<Self, BlobError> {
        let presign_ttl_secs = std::env::var("BLOB_PRESIGN_TTL_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse::<u64>()
            .map_err(|_| BlobError::Config("BLOB_PRESIGN_TTL_SECS must be a number".to_string()))?;

        Ok(S3Config {
            endpoint: std::env::var("BLOB_ENDPOINT").ok().filter(|v| !v.is_empty()),
            region: std::env::var("BLOB_REGION").ok().filter(|v| !v.is_empty()),
            presign_ttl: Duration::from_secs(presign_ttl_secs),
        })
    }
}

/// BlobStore implementation over the AWS S3 SDK
///
/// Credentials come from the standard AWS provider chain
/// (`AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, profiles, IMDS).
/// Public URLs are presigned GET URLs, which honour `Range` headers.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    presign_ttl: Duration,
}

impl S3BlobStore {
    /// Build a store from configuration, resolving AWS credentials once
    pub async fn connect(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            tracing::info!(endpoint = %endpoint, "Using custom S3 endpoint");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            presign_ttl: config.presign_ttl,
        }
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, presign_ttl: Duration) -> Self {
        Self { client, presign_ttl }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<String>> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| BlobError::List {
                prefix: prefix.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(str::to_string)
            .collect())
    }

    async fn download(&self, bucket: &str, key: &str) -> BlobResult<BlobObject> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|service| service.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    BlobError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    BlobError::Download {
                        key: key.to_string(),
                        message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        let content_type = output.content_type().map(str::to_string);
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| BlobError::Download {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        tracing::debug!(bucket = %bucket, key = %key, size = bytes.len(), "Downloaded object");

        Ok(BlobObject {
            key: key.to_string(),
            bytes,
            content_type,
        })
    }

    async fn public_url(&self, bucket: &str, key: &str) -> BlobResult<String> {
        let presigning = PresigningConfig::expires_in(self.presign_ttl).map_err(|e| {
            BlobError::PublicUrl {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| BlobError::PublicUrl {
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        Ok(request.uri().to_string())
    }
}
