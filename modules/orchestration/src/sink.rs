//! Downstream dispatch sink
//!
//! The sink accepts one multipart POST per bulk send and performs the
//! actual sending. Field names are fixed:
//! `job_ids`, `user_email`, `gmail_account_id`, `access_token`,
//! `refresh_token`, `timestamp`, and the optional files `cv` and
//! `cover_letter`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::attachments::ResolvedAttachment;

const SINK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Sink rejected dispatch (status {status_code}): {body}")]
    Rejected { status_code: u16, body: String },

    #[error("Invalid multipart payload: {0}")]
    Payload(String),
}

/// Everything sent in one bulk dispatch
#[derive(Debug, Clone)]
pub struct DispatchEnvelope {
    pub job_ids: Vec<String>,
    pub user_email: String,
    pub gmail_account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub timestamp: DateTime<Utc>,
    pub cv: Option<ResolvedAttachment>,
    pub cover_letter: Option<ResolvedAttachment>,
}

/// Accepted response from the sink
#[derive(Debug, Clone, PartialEq)]
pub struct SinkResponse {
    pub status: u16,
    /// JSON body when it parses, the raw text otherwise
    pub body: JsonValue,
}

#[async_trait]
pub trait DispatchSink: Send + Sync {
    async fn send(&self, envelope: DispatchEnvelope) -> Result<SinkResponse, SinkError>;
}

impl fmt::Debug for dyn DispatchSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchSink")
    }
}

/// Sink reached over HTTP
#[derive(Clone)]
pub struct HttpDispatchSink {
    url: String,
    http_client: Client,
}

impl HttpDispatchSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let http_client = Client::builder()
            .timeout(SINK_TIMEOUT)
            .build()
            .map_err(|e| SinkError::HttpError(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

fn file_part(attachment: ResolvedAttachment) -> Result<Part, SinkError> {
    Part::bytes(attachment.bytes.to_vec())
        .file_name(attachment.filename)
        .mime_str(&attachment.mime_type)
        .map_err(|e| SinkError::Payload(e.to_string()))
}

/// Build the multipart form for an envelope
pub fn build_form(envelope: DispatchEnvelope) -> Result<Form, SinkError> {
    let job_ids =
        serde_json::to_string(&envelope.job_ids).map_err(|e| SinkError::Payload(e.to_string()))?;

    let mut form = Form::new()
        .text("job_ids", job_ids)
        .text("user_email", envelope.user_email)
        .text("gmail_account_id", envelope.gmail_account_id)
        .text("access_token", envelope.access_token)
        .text("refresh_token", envelope.refresh_token)
        .text(
            "timestamp",
            envelope.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

    if let Some(cv) = envelope.cv {
        form = form.part("cv", file_part(cv)?);
    }
    if let Some(cover_letter) = envelope.cover_letter {
        form = form.part("cover_letter", file_part(cover_letter)?);
    }

    Ok(form)
}

#[async_trait]
impl DispatchSink for HttpDispatchSink {
    async fn send(&self, envelope: DispatchEnvelope) -> Result<SinkResponse, SinkError> {
        let form = build_form(envelope)?;

        let response = self
            .http_client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SinkError::HttpError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read sink response".to_string());

        if !status.is_success() {
            return Err(SinkError::Rejected {
                status_code: status.as_u16(),
                body: text,
            });
        }

        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));
        Ok(SinkResponse {
            status: status.as_u16(),
            body,
        })
    }
}
