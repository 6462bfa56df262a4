//! Gateway A: hosted checkout SDK
//!
//! Flow:
//! 1. `POST {base}/login` with merchant credentials returns a session token
//! 2. The client SDK is initialised with the payload built here and the payer
//!    completes the payment on the provider's page
//! 3. The provider redirects the browser (GET) and/or calls the webhook (POST)
//!    with a status code, transaction reference and the continuation token

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use super::continuation::{ContinuationCodec, ContinuationToken};
use super::error::GatewayError;
use super::{
    generate_order_ref, json_str, CallbackKind, Initiation, PaymentGateway, ProviderCallback,
    ReportedStatus, Settlement, PROVIDER_TIMEOUT,
};
use crate::models::{InitiatePaymentRequest, PaymentRecord, Provider};

/// Path of the callback endpoint the provider redirects to
pub const CALLBACK_PATH: &str = "/api/payments/callback/gateway-a";

/// Capture mode requested from the hosted SDK
const CAPTURE_MODE: &str = "AUTH_CAPTURE";

/// Configuration for the hosted checkout provider
#[derive(Debug, Clone)]
pub struct HostedCheckoutConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Absolute URL of this service's callback endpoint
    pub callback_url: String,
}

impl HostedCheckoutConfig {
    /// Load configuration from `GATEWAY_A_*` environment variables
    pub fn from_env(public_base_url: &str) -> Result<Self, GatewayError> {
        let base_url = std::env::var("GATEWAY_A_BASE_URL")
            .map_err(|_| GatewayError::ConfigError("Missing GATEWAY_A_BASE_URL".to_string()))?;
        let username = std::env::var("GATEWAY_A_USERNAME")
            .map_err(|_| GatewayError::ConfigError("Missing GATEWAY_A_USERNAME".to_string()))?;
        let password = std::env::var("GATEWAY_A_PASSWORD")
            .map_err(|_| GatewayError::ConfigError("Missing GATEWAY_A_PASSWORD".to_string()))?;

        Ok(HostedCheckoutConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            callback_url: format!("{}{}", public_base_url.trim_end_matches('/'), CALLBACK_PATH),
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(GatewayError::ConfigError(
                "gateway A credentials are empty".to_string(),
            ));
        }
        if self.base_url.is_empty() {
            return Err(GatewayError::ConfigError("gateway A base URL is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access_token")]
    token: String,
}

/// Callback field names, in order of preference
const STATUS_FIELDS: &[&str] = &["status", "payment_status", "response_status"];
const CONTINUATION_FIELDS: &[&str] = &["continuation", "udf1"];

/// Map a provider status code onto a reported outcome
///
/// Only `approved` completes a payment; unknown codes fail it.
pub fn map_status_code(status: &str) -> ReportedStatus {
    match status.trim().to_ascii_lowercase().as_str() {
        "approved" => ReportedStatus::Approved,
        "pending" => ReportedStatus::Pending,
        other => ReportedStatus::Declined(other.to_string()),
    }
}

/// Gateway A adapter
#[derive(Clone)]
pub struct HostedCheckoutGateway {
    config: Arc<HostedCheckoutConfig>,
    codec: ContinuationCodec,
    http_client: Client,
}

impl HostedCheckoutGateway {
    pub fn new(
        config: HostedCheckoutConfig,
        codec: ContinuationCodec,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            codec,
            http_client,
        })
    }

    /// Obtain a short-lived session token for the client SDK
    pub async fn login(&self) -> Result<String, GatewayError> {
        let url = format!("{}/login", self.config.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest {
                username: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(GatewayError::ApiError {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;

        Ok(login.token)
    }

}

fn payment_method_details(raw: &JsonValue) -> JsonValue {
    json!({
        "provider": Provider::GatewayA.as_str(),
        "method": json_str(raw, &["payment_method", "method"]),
        "card_brand": json_str(raw, &["card_brand", "card_type"]),
        "card_last4": json_str(raw, &["card_last4", "masked_card"]),
    })
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    fn provider(&self) -> Provider {
        Provider::GatewayA
    }

    async fn initiate(&self, request: &InitiatePaymentRequest) -> Result<Initiation, GatewayError> {
        let token = self.login().await?;

        let payment_id = Uuid::new_v4();
        let order_ref = generate_order_ref(Provider::GatewayA, &request.user_id);
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| "USD".to_string())
            .to_ascii_uppercase();

        let continuation = self.codec.encode(&ContinuationToken {
            user_id: request.user_id.clone(),
            payment_id,
            plan: request.plan.clone(),
        })?;

        let init_payload = json!({
            "token": token,
            "order_reference": order_ref,
            "amount": request.amount.to_string(),
            "currency": currency,
            "description": format!("{} plan", request.plan),
            "capture_mode": CAPTURE_MODE,
            "billing": request.billing,
            "redirect_url": self.config.callback_url,
            "webhook_url": self.config.callback_url,
            "continuation": continuation,
        });

        let record = PaymentRecord::new_pending(
            payment_id,
            &request.user_id,
            &request.plan,
            request.amount,
            &currency,
            Provider::GatewayA,
            order_ref,
            json!({
                "billing_email": request.billing.email,
                "continuation_signed": self.codec.is_signed(),
            }),
        );

        tracing::info!(
            payment_id = %payment_id,
            order_ref = %record.order_ref,
            user_id = %request.user_id,
            "Hosted checkout session created"
        );

        Ok(Initiation { record, init_payload })
    }

    fn parse_callback(&self, raw: &JsonValue) -> Result<ProviderCallback, GatewayError> {
        if !raw.is_object() {
            return Err(GatewayError::InvalidCallback(
                "callback payload must be an object".to_string(),
            ));
        }

        let continuation = json_str(raw, CONTINUATION_FIELDS)
            .ok_or_else(|| GatewayError::InvalidCallback("missing continuation".to_string()))?;
        let token = self.codec.decode(&continuation)?;

        let status = json_str(raw, STATUS_FIELDS)
            .ok_or_else(|| GatewayError::InvalidCallback("missing status".to_string()))?;

        Ok(ProviderCallback {
            payment_id: token.payment_id,
            user_id: Some(token.user_id),
            kind: CallbackKind::StatusReport {
                status: map_status_code(&status),
                transaction_ref: json_str(raw, &["transaction_ref", "transaction_id", "tran_ref"]),
                payment_method: payment_method_details(raw),
            },
        })
    }

    async fn apply_callback(
        &self,
        record: &PaymentRecord,
        callback: &ProviderCallback,
    ) -> Result<Settlement, GatewayError> {
        let CallbackKind::StatusReport {
            status,
            transaction_ref,
            payment_method,
        } = &callback.kind
        else {
            return Err(GatewayError::InvalidCallback(
                "gateway A callbacks must carry a status".to_string(),
            ));
        };

        let settlement = match status {
            ReportedStatus::Approved => Settlement::Completed {
                transaction_ref: transaction_ref.clone(),
                metadata: json!({ "provider_status": "approved" }),
                payment_method: payment_method.clone(),
            },
            ReportedStatus::Pending => Settlement::Pending,
            ReportedStatus::Declined(code) => Settlement::Failed {
                metadata: json!({
                    "provider_status": code,
                    "transaction_ref": transaction_ref,
                }),
            },
        };

        tracing::debug!(
            payment_id = %record.id,
            order_ref = %record.order_ref,
            status = ?status,
            "Hosted checkout callback mapped"
        );

        Ok(settlement)
    }

    async fn verify(&self, _record: &PaymentRecord) -> Result<Option<Settlement>, GatewayError> {
        // The hosted SDK has no status lookup; callbacks are the only signal
        Ok(None)
    }
}
