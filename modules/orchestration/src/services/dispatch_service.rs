//! Bulk application dispatch
//!
//! Resolves the referenced documents and forwards one multipart payload to
//! the dispatch sink. The batch is all or nothing: a document that cannot be
//! resolved stops the dispatch before the sink is contacted, and a sink
//! rejection is returned to the caller with the sink's body.

use chrono::Utc;
use std::sync::Arc;

use crate::attachments::{AttachmentError, AttachmentResolver, ResolvedAttachment};
use crate::models::{DispatchRequest, DispatchResult};
use crate::sink::{DispatchEnvelope, DispatchSink, SinkError};
use crate::validation::{validate_dispatch_request, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Attachment(#[from] AttachmentError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

pub type DispatchOutcome<T> = Result<T, DispatchError>;

#[derive(Clone)]
pub struct DispatchService {
    resolver: AttachmentResolver,
    sink: Option<Arc<dyn DispatchSink>>,
}

impl DispatchService {
    pub fn new(resolver: AttachmentResolver, sink: Option<Arc<dyn DispatchSink>>) -> Self {
        Self { resolver, sink }
    }

    async fn resolve_optional(
        &self,
        user_id: &str,
        reference: Option<&str>,
    ) -> Result<Option<ResolvedAttachment>, AttachmentError> {
        match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reference) => {
                let reference = self.resolver.reference(user_id, reference);
                self.resolver.resolve(&reference).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Send a batch of applications through the sink
    pub async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome<DispatchResult> {
        validate_dispatch_request(request)?;
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| DispatchError::Configuration("dispatch sink is not configured".to_string()))?;

        // Each document resolves on its own; a failure in one does not
        // cancel the other.
        let (cv, cover_letter) = tokio::join!(
            self.resolve_optional(&request.user_id, request.cv_ref.as_deref()),
            self.resolve_optional(&request.user_id, request.cover_letter_ref.as_deref()),
        );
        let cv = cv?;
        let cover_letter = cover_letter?;

        let job_count = request.job_ids.len();
        let envelope = DispatchEnvelope {
            job_ids: request.job_ids.iter().map(|id| id.trim().to_string()).collect(),
            user_email: request.user_email.trim().to_string(),
            gmail_account_id: request.credentials.gmail_account_id.clone(),
            access_token: request.credentials.access_token.clone(),
            refresh_token: request.credentials.refresh_token.clone(),
            timestamp: Utc::now(),
            cv,
            cover_letter,
        };
        let has_cv = envelope.cv.is_some();
        let has_cover_letter = envelope.cover_letter.is_some();

        let response = sink.send(envelope).await.map_err(|e| {
            tracing::error!(
                user_id = %request.user_id,
                job_count,
                error = %e,
                "Bulk dispatch rejected"
            );
            e
        })?;

        tracing::info!(
            user_id = %request.user_id,
            job_count,
            has_cv,
            has_cover_letter,
            sink_status = response.status,
            "Bulk dispatch accepted"
        );

        Ok(DispatchResult {
            accepted: true,
            job_count,
            sink_status: response.status,
            sink_response: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MailCredentials;
    use crate::sink::SinkResponse;
    use async_trait::async_trait;
    use blob_storage::InMemoryBlobStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<DispatchEnvelope>>,
    }

    #[async_trait]
    impl DispatchSink for RecordingSink {
        async fn send(&self, envelope: DispatchEnvelope) -> Result<SinkResponse, SinkError> {
            self.sent.lock().unwrap().push(envelope);
            Ok(SinkResponse {
                status: 200,
                body: serde_json::json!({"queued": true}),
            })
        }
    }

    fn request(cv_ref: Option<&str>) -> DispatchRequest {
        DispatchRequest {
            job_ids: vec!["job-1".to_string(), "job-2".to_string()],
            user_id: "u1".to_string(),
            user_email: "u1@example.com".to_string(),
            credentials: MailCredentials {
                gmail_account_id: "acct-1".to_string(),
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
            },
            cv_ref: cv_ref.map(str::to_string),
            cover_letter_ref: None,
        }
    }

    fn service(store: InMemoryBlobStore, sink: Arc<RecordingSink>) -> DispatchService {
        let resolver = AttachmentResolver::new(Arc::new(store), "documents").unwrap();
        DispatchService::new(resolver, Some(sink as Arc<dyn DispatchSink>))
    }

    #[tokio::test]
    async fn test_unresolvable_cv_never_reaches_sink() {
        let sink = Arc::new(RecordingSink::default());
        let service = service(InMemoryBlobStore::new(), sink.clone());

        let err = service.dispatch(&request(Some("missing.pdf"))).await.unwrap_err();
        assert!(matches!(err, DispatchError::Attachment(AttachmentError::Unavailable { .. })));
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_without_attachments() {
        let sink = Arc::new(RecordingSink::default());
        let service = service(InMemoryBlobStore::new(), sink.clone());

        let result = service.dispatch(&request(None)).await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.job_count, 2);

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].cv.is_none());
        assert_eq!(sent[0].job_ids, vec!["job-1", "job-2"]);
    }

    #[tokio::test]
    async fn test_dispatch_without_sink_is_configuration_error() {
        let resolver = AttachmentResolver::new(Arc::new(InMemoryBlobStore::new()), "documents").unwrap();
        let service = DispatchService::new(resolver, None);
        assert!(matches!(
            service.dispatch(&request(None)).await,
            Err(DispatchError::Configuration(_))
        ));
    }
}
