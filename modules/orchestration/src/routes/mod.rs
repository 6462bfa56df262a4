pub mod campaigns;
pub mod error;
pub mod payments;

use axum::{
    routing::{get, post},
    Router,
};

use crate::health::health;
use crate::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/payments", post(payments::initiate_payment))
        .route(
            "/api/payments/callback/gateway-a",
            get(payments::gateway_a_redirect).post(payments::gateway_a_webhook),
        )
        .route(
            "/api/payments/callback/gateway-b",
            get(payments::gateway_b_redirect),
        )
        .route(
            "/api/payments/gateway-b/payment-tokens",
            post(payments::create_payment_token),
        )
        .route("/api/payments/gateway-b/orders", post(payments::capture_order))
        .route("/api/payments/{reference}", get(payments::verify_payment))
        .route("/api/campaigns", post(campaigns::request_campaign))
        .route("/api/campaigns/bulk-send", post(campaigns::bulk_send))
        .with_state(state)
}
