//! Mapping of service errors onto HTTP responses
//!
//! Bodies are `{ "error": code, "message": text }`, sometimes with extra
//! context (the blocking campaign, the sink's response). Ledger failures
//! are logged and answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};

use crate::attachments::AttachmentError;
use crate::ledger::LedgerError;
use crate::models::ErrorResponse;
use crate::services::admission_service::AdmissionError;
use crate::services::dispatch_service::DispatchError;
use crate::services::payment_service::PaymentError;
use crate::sink::SinkError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: JsonValue,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        let body = serde_json::to_value(ErrorResponse::new(error, message))
            .unwrap_or_else(|_| json!({ "error": error }));
        Self { status, body }
    }

    fn with(mut self, key: &str, value: JsonValue) -> Self {
        if let Some(map) = self.body.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Short machine-readable code of the error
    pub fn code(&self) -> &str {
        self.body
            .get("error")
            .and_then(JsonValue::as_str)
            .unwrap_or("internal_error")
    }

    fn ledger(error: &LedgerError) -> Self {
        tracing::error!(error = %error, "Ledger operation failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ledger_error",
            "Internal storage error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(error: PaymentError) -> Self {
        match &error {
            PaymentError::Configuration(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "configuration_error",
                error.to_string(),
            ),
            PaymentError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", error.to_string())
            }
            PaymentError::InvalidCallback(_) | PaymentError::ProviderMismatch(..) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_callback", error.to_string())
            }
            PaymentError::AlreadySettled(..) => {
                Self::new(StatusCode::CONFLICT, "already_settled", error.to_string())
            }
            PaymentError::Provider(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "provider_error", error.to_string())
            }
            PaymentError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", error.to_string())
            }
            PaymentError::Ledger(e) => Self::ledger(e),
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(error: AdmissionError) -> Self {
        match &error {
            AdmissionError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", error.to_string())
            }
            AdmissionError::Conflict(existing) => Self::new(
                StatusCode::CONFLICT,
                "active_campaign_exists",
                error.to_string(),
            )
            .with(
                "campaign",
                serde_json::to_value(existing.as_ref()).unwrap_or(JsonValue::Null),
            ),
            AdmissionError::Provider(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "provider_error", error.to_string())
            }
            AdmissionError::Ledger(e) => Self::ledger(e),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match &error {
            DispatchError::Configuration(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "configuration_error",
                error.to_string(),
            ),
            DispatchError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", error.to_string())
            }
            DispatchError::Attachment(AttachmentError::EmptyReference) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", error.to_string())
            }
            DispatchError::Attachment(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "attachment_unavailable",
                error.to_string(),
            ),
            DispatchError::Sink(SinkError::Rejected { status_code, body }) => Self::new(
                StatusCode::BAD_GATEWAY,
                "provider_error",
                error.to_string(),
            )
            .with("sink_status", JsonValue::from(*status_code))
            .with(
                "sink_response",
                serde_json::from_str(body).unwrap_or_else(|_| JsonValue::String(body.clone())),
            ),
            DispatchError::Sink(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "provider_error", error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_payment_error_statuses() {
        let cases = [
            (PaymentError::Configuration("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (PaymentError::Provider("x".into()), StatusCode::BAD_GATEWAY),
            (PaymentError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PaymentError::InvalidCallback("x".into()), StatusCode::BAD_REQUEST),
            (
                PaymentError::Ledger(LedgerError::Unavailable("db down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn test_ledger_details_not_leaked() {
        let error = ApiError::from(PaymentError::Ledger(LedgerError::Unavailable(
            "password=hunter2".into(),
        )));
        assert!(!error.body.to_string().contains("hunter2"));
        assert_eq!(error.code(), "ledger_error");
    }

    #[test]
    fn test_sink_rejection_keeps_body() {
        let error = ApiError::from(DispatchError::Sink(SinkError::Rejected {
            status_code: 429,
            body: r#"{"error":"quota"}"#.to_string(),
        }));
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(error.body["sink_status"], 429);
        assert_eq!(error.body["sink_response"]["error"], "quota");
    }

    #[test]
    fn test_already_settled_is_conflict() {
        let error = ApiError::from(PaymentError::AlreadySettled(
            Uuid::nil(),
            crate::models::PaymentStatus::Failed,
        ));
        assert_eq!(error.status, StatusCode::CONFLICT);
    }
}
