//! Attachment resolution
//!
//! Turns a document reference (bare filename or `folder/filename` key) into
//! bytes. Two strategies are tried in order:
//! 1. direct download through the blob store
//! 2. a public URL for the same key, fetched with a plain HTTP GET
//!
//! Both failing is terminal for that attachment; there are no retries.

use blob_storage::{user_scoped_key, BlobStore};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Attachment reference is empty")]
    EmptyReference,

    #[error("Attachment {reference} unavailable: {last_error}")]
    Unavailable {
        reference: String,
        last_error: String,
    },

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Logical location of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReference {
    pub user_id: String,
    pub bucket: String,
    pub filename: String,
}

/// A fetched document, ready to attach
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub bytes: Bytes,
    pub mime_type: String,
    pub filename: String,
}

#[derive(Clone)]
pub struct AttachmentResolver {
    store: Arc<dyn BlobStore>,
    bucket: String,
    http_client: Client,
}

impl AttachmentResolver {
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Result<Self, AttachmentError> {
        let http_client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AttachmentError::Client(e.to_string()))?;

        Ok(Self {
            store,
            bucket: bucket.into(),
            http_client,
        })
    }

    pub fn reference(&self, user_id: &str, filename: &str) -> AttachmentReference {
        AttachmentReference {
            user_id: user_id.to_string(),
            bucket: self.bucket.clone(),
            filename: filename.trim().to_string(),
        }
    }

    /// Resolve a user's document reference to its bytes
    pub async fn resolve(
        &self,
        reference: &AttachmentReference,
    ) -> Result<ResolvedAttachment, AttachmentError> {
        if reference.filename.is_empty() {
            return Err(AttachmentError::EmptyReference);
        }

        let key = self.locate_key(reference).await;
        let filename = key.rsplit('/').next().unwrap_or(&key).to_string();

        let download_error = match self.store.download(&reference.bucket, &key).await {
            Ok(object) => {
                tracing::debug!(key = %key, bytes = object.bytes.len(), "Attachment downloaded");
                return Ok(ResolvedAttachment {
                    mime_type: mime_type(object.content_type.as_deref(), &filename),
                    bytes: object.bytes,
                    filename,
                });
            }
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            key = %key,
            error = %download_error,
            "Direct download failed, trying public URL"
        );

        match self.fetch_public(&reference.bucket, &key).await {
            Ok((bytes, content_type)) => {
                tracing::debug!(key = %key, bytes = bytes.len(), "Attachment fetched by URL");
                Ok(ResolvedAttachment {
                    mime_type: mime_type(content_type.as_deref(), &filename),
                    bytes,
                    filename,
                })
            }
            Err(last_error) => {
                tracing::error!(
                    key = %key,
                    download_error = %download_error,
                    error = %last_error,
                    "Attachment unavailable"
                );
                Err(AttachmentError::Unavailable {
                    reference: reference.filename.clone(),
                    last_error,
                })
            }
        }
    }

    /// Object key for a reference.
    ///
    /// Path-qualified references are keys already. A bare filename lives in
    /// the user's folder when the listing shows it there, otherwise at the
    /// bucket root where older uploads were stored.
    async fn locate_key(&self, reference: &AttachmentReference) -> String {
        let filename = reference.filename.trim_start_matches('/');
        if filename.contains('/') {
            return filename.to_string();
        }

        let scoped = user_scoped_key(&reference.user_id, filename);
        let prefix = format!("{}/", reference.user_id.trim_end_matches('/'));

        match self.store.list(&reference.bucket, &prefix).await {
            Ok(keys) if keys.iter().any(|key| key == &scoped) => scoped,
            Ok(_) => {
                tracing::debug!(
                    filename = %filename,
                    user_id = %reference.user_id,
                    "Document not in user folder, using root layout"
                );
                filename.to_string()
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Listing failed, assuming user folder");
                scoped
            }
        }
    }

    async fn fetch_public(&self, bucket: &str, key: &str) -> Result<(Bytes, Option<String>), String> {
        let url = self
            .store
            .public_url(bucket, key)
            .await
            .map_err(|e| e.to_string())?;

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("GET {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("GET {} returned {}", url, status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("reading {} failed: {}", url, e))?;

        Ok((bytes, content_type))
    }
}

/// Reported content type, else guessed from the extension
fn mime_type(reported: Option<&str>, filename: &str) -> String {
    reported
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != DEFAULT_MIME_TYPE)
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(filename).first_raw().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_storage::InMemoryBlobStore;

    const BUCKET: &str = "documents";

    fn resolver(store: InMemoryBlobStore) -> AttachmentResolver {
        AttachmentResolver::new(Arc::new(store), BUCKET).unwrap()
    }

    #[tokio::test]
    async fn test_user_folder_layout() {
        let store = InMemoryBlobStore::new();
        store.put(BUCKET, "u1/cv.pdf", &b"%PDF-1.7"[..], Some("application/pdf"));
        let resolver = resolver(store);

        let attachment = resolver.resolve(&resolver.reference("u1", "cv.pdf")).await.unwrap();
        assert_eq!(&attachment.bytes[..], b"%PDF-1.7");
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.filename, "cv.pdf");
    }

    #[tokio::test]
    async fn test_legacy_root_layout() {
        let store = InMemoryBlobStore::new();
        store.put(BUCKET, "cover.docx", &b"legacy"[..], None);
        let resolver = resolver(store);

        let attachment = resolver.resolve(&resolver.reference("u1", "cover.docx")).await.unwrap();
        assert_eq!(&attachment.bytes[..], b"legacy");
        assert_eq!(
            attachment.mime_type,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
    }

    #[tokio::test]
    async fn test_path_qualified_reference() {
        let store = InMemoryBlobStore::new();
        store.put(BUCKET, "shared/u1/cv.pdf", &b"x"[..], None);
        let resolver = resolver(store);

        let attachment = resolver
            .resolve(&resolver.reference("u1", "shared/u1/cv.pdf"))
            .await
            .unwrap();
        assert_eq!(attachment.filename, "cv.pdf");
        assert_eq!(attachment.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_both_strategies_failing_is_unavailable() {
        let resolver = resolver(InMemoryBlobStore::new());
        let err = resolver
            .resolve(&resolver.reference("u1", "missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Unavailable { ref reference, .. } if reference == "missing.pdf"));
    }

    #[test]
    fn test_mime_type_fallbacks() {
        assert_eq!(mime_type(Some("application/pdf"), "x.bin"), "application/pdf");
        assert_eq!(mime_type(Some(DEFAULT_MIME_TYPE), "x.pdf"), "application/pdf");
        assert_eq!(mime_type(None, "no-extension"), DEFAULT_MIME_TYPE);
    }
}
