use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;

use crate::AppState;

/// Health check endpoint handler
///
/// Reports 503 when the Ledger does not answer.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, ledger) = match state.ledger.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "healthy" } else { "degraded" },
            "service": "orchestration-rs",
            "version": env!("CARGO_PKG_VERSION"),
            "ledger": ledger,
            "providers": state.providers,
        })),
    )
}
