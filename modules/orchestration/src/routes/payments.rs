//! Payment API Routes
//!
//! Browser-facing callbacks (GET) answer with a `303 See Other` back to the
//! web app; server-to-server calls answer with JSON.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::ApiError;
use crate::models::{
    CallbackResponse, CaptureOrderRequest, InitiatePaymentRequest, InitiatePaymentResponse,
    PaymentTokenRequest, PaymentTokenResponse, Provider, VerifyPaymentResponse,
};
use crate::AppState;

/// Handler for POST /api/payments
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), ApiError> {
    let response = state.payments.initiate_payment(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /api/payments/{reference}
///
/// `reference` is a payment id or an order reference.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let response = state.payments.verify_payment(&reference).await?;
    Ok(Json(response))
}

/// Handler for GET /api/payments/callback/gateway-a (browser redirect)
pub async fn gateway_a_redirect(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    redirect_callback(&state, Provider::GatewayA, params).await
}

/// Handler for POST /api/payments/callback/gateway-a (server webhook)
pub async fn gateway_a_webhook(
    State(state): State<AppState>,
    Json(payload): Json<JsonValue>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let response = state
        .payments
        .handle_provider_callback(Provider::GatewayA, &payload)
        .await?;
    Ok(Json(response))
}

/// Handler for GET /api/payments/callback/gateway-b (approval redirect)
pub async fn gateway_b_redirect(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    redirect_callback(&state, Provider::GatewayB, params).await
}

/// Handler for POST /api/payments/gateway-b/payment-tokens
pub async fn create_payment_token(
    State(state): State<AppState>,
    Json(request): Json<PaymentTokenRequest>,
) -> Result<Json<PaymentTokenResponse>, ApiError> {
    let response = state.payments.create_payment_token(&request).await?;
    Ok(Json(response))
}

/// Handler for POST /api/payments/gateway-b/orders
pub async fn capture_order(
    State(state): State<AppState>,
    Json(request): Json<CaptureOrderRequest>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let response = state.payments.force_capture(&request).await?;
    Ok(Json(response))
}

async fn redirect_callback(
    state: &AppState,
    provider: Provider,
    params: HashMap<String, String>,
) -> Response {
    let raw = JsonValue::Object(
        params
            .into_iter()
            .map(|(key, value)| (key, JsonValue::String(value)))
            .collect(),
    );

    let location = match state.payments.handle_provider_callback(provider, &raw).await {
        Ok(response) => status_page(&state.frontend_url, &response),
        Err(e) => {
            let error = ApiError::from(e);
            tracing::warn!(
                provider = %provider,
                status = %error.status,
                code = %error.code(),
                "Payment callback rejected"
            );
            format!("{}/payment/error?reason={}", state.frontend_url, error.code())
        }
    };

    see_other(&location)
}

/// `{frontend}/payment/{status}?payment_id={id}`
pub fn status_page(frontend_url: &str, response: &CallbackResponse) -> String {
    status_url(frontend_url, response.status.as_str(), response.payment_id)
}

fn status_url(frontend_url: &str, status: &str, payment_id: Uuid) -> String {
    format!("{}/payment/{}?payment_id={}", frontend_url, status, payment_id)
}

fn see_other(location: &str) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location.to_string())]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;

    #[test]
    fn test_status_page_distinguishes_outcomes() {
        let payment_id = Uuid::nil();
        let page = |status| {
            status_page(
                "https://app.example.com",
                &CallbackResponse { payment_id, status },
            )
        };
        assert_eq!(
            page(PaymentStatus::Completed),
            format!("https://app.example.com/payment/completed?payment_id={}", payment_id)
        );
        assert!(page(PaymentStatus::Failed).contains("/payment/failed?"));
        assert!(page(PaymentStatus::Abandoned).contains("/payment/abandoned?"));
        assert!(page(PaymentStatus::Pending).contains("/payment/pending?"));
    }
}
