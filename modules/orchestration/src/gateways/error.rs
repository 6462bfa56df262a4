use crate::ledger::LedgerError;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("API error (status {status_code}): {message}")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Payment declined by provider: {0}")]
    Declined(String),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Continuation token signature verification failed")]
    ContinuationVerificationFailed,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl GatewayError {
    /// Whether the error originated in this service's storage rather than
    /// the provider
    pub fn is_ledger_error(&self) -> bool {
        matches!(self, GatewayError::Ledger(_))
    }

    /// Whether the error came from the callback payload rather than a provider
    pub fn is_invalid_callback(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidCallback(_) | GatewayError::ContinuationVerificationFailed
        )
    }

    /// Diagnostic metadata kept on a failed payment record.
    ///
    /// Provider bodies are stored as JSON when they parse, raw text otherwise.
    pub fn diagnostics(&self, step: &str) -> JsonValue {
        let mut details = serde_json::json!({
            "failed_step": step,
            "error": self.to_string(),
        });
        if let GatewayError::ApiError { status_code, message } = self {
            let body = serde_json::from_str::<JsonValue>(message)
                .unwrap_or_else(|_| JsonValue::String(message.clone()));
            details["provider_status"] = JsonValue::from(*status_code);
            details["provider_body"] = body;
        }
        details
    }
}
