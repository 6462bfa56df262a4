//! In-memory implementation of the BlobStore trait for testing and development

use crate::{BlobError, BlobObject, BlobResult, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: Option<String>,
}

/// BlobStore implementation backed by an in-process map
///
/// Public URLs are only produced when a base URL is configured with
/// [`InMemoryBlobStore::with_public_base_url`]; they are built without
/// checking that the object exists, the same way hosted stores build
/// public links.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
    public_base_url: Option<String>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve public URLs as `{base_url}/{bucket}/{key}`
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Store an object, replacing any existing one under the same key
    pub fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: impl Into<Bytes>,
        content_type: Option<&str>,
    ) {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<String>> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn download(&self, bucket: &str, key: &str) -> BlobResult<BlobObject> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let stored = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        Ok(BlobObject {
            key: key.to_string(),
            bytes: stored.bytes.clone(),
            content_type: stored.content_type.clone(),
        })
    }

    async fn public_url(&self, bucket: &str, key: &str) -> BlobResult<String> {
        match &self.public_base_url {
            Some(base) => Ok(format!("{}/{}/{}", base, bucket, key)),
            None => Err(BlobError::PublicUrl {
                key: key.to_string(),
                message: "no public base URL configured".to_string(),
            }),
        }
    }
}
