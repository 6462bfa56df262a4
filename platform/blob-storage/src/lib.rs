//! # Blob Storage Abstraction
//!
//! A platform-level abstraction over the object store that holds user
//! documents (resumes, cover letters).
//!
//! ## Implementations
//!
//! - **S3BlobStore**: Production implementation for any S3-compatible store
//! - **InMemoryBlobStore**: Test/dev implementation backed by a map
//!
//! ## Key Layout
//!
//! Documents are stored per user under `{user_id}/{filename}`. Older uploads
//! live at the bucket root as a bare `{filename}`; callers that need to read
//! both layouts use [`BlobStore::list`] to find out which one applies.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blob_storage::{BlobStore, InMemoryBlobStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
//! let object = store.download("documents", "user-1/resume.pdf").await?;
//! println!("{} bytes ({:?})", object.bytes.len(), object.content_type);
//! # Ok(())
//! # }
//! ```

mod inmemory;
mod s3;

pub use inmemory::InMemoryBlobStore;
pub use s3::{S3BlobStore, S3Config};

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// An object fetched from the store
#[derive(Debug, Clone)]
pub struct BlobObject {
    /// The key the object was read from
    pub key: String,
    /// Raw object content
    pub bytes: Bytes,
    /// Content type recorded by the store, if any
    pub content_type: Option<String>,
}

/// Errors that can occur when talking to the object store
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("failed to download {key}: {message}")]
    Download { key: String, message: String },

    #[error("failed to list {prefix}: {message}")]
    List { prefix: String, message: String },

    #[error("failed to build public URL for {key}: {message}")]
    PublicUrl { key: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for blob storage operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Read access to a bucketed object store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List the object keys under a prefix (e.g. `"user-1/"`)
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<String>>;

    /// Download an object by key
    async fn download(&self, bucket: &str, key: &str) -> BlobResult<BlobObject>;

    /// Produce a URL that serves the object over plain HTTP GET
    /// (including `Range` requests)
    async fn public_url(&self, bucket: &str, key: &str) -> BlobResult<String>;
}

impl fmt::Debug for dyn BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobStore")
    }
}

/// Key of a document in the per-user folder layout
pub fn user_scoped_key(user_id: &str, filename: &str) -> String {
    format!("{}/{}", user_id.trim_end_matches('/'), filename.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_scoped_key() {
        assert_eq!(user_scoped_key("u1", "cv.pdf"), "u1/cv.pdf");
        assert_eq!(user_scoped_key("u1/", "/cv.pdf"), "u1/cv.pdf");
    }
}
