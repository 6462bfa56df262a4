use reqwest::Client;
use std::sync::Arc;

use super::types::{
    AccessTokenResponse, CreateOrderRequest, CreatePaymentTokenRequest, CreateSetupTokenRequest,
    Order, PaymentToken, SetupToken,
};
use super::VaultConfig;
use crate::gateways::error::GatewayError;
use crate::gateways::PROVIDER_TIMEOUT;

/// HTTP client for the vault provider's REST API
#[derive(Clone)]
pub struct VaultClient {
    config: Arc<VaultConfig>,
    http_client: Client,
}

impl VaultClient {
    pub fn new(config: Arc<VaultConfig>) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        Ok(Self { config, http_client })
    }

    /// OAuth client-credentials grant
    pub async fn access_token(&self) -> Result<String, GatewayError> {
        let url = format!("{}/v1/oauth2/token", self.config.base_url);
        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        let token: AccessTokenResponse = self.handle_response(response).await?;
        Ok(token.access_token)
    }

    pub async fn create_setup_token(
        &self,
        request: &CreateSetupTokenRequest,
        request_id: &str,
    ) -> Result<SetupToken, GatewayError> {
        self.post("/v3/vault/setup-tokens", request, request_id).await
    }

    pub async fn create_payment_token(
        &self,
        request: &CreatePaymentTokenRequest,
        request_id: &str,
    ) -> Result<PaymentToken, GatewayError> {
        self.post("/v3/vault/payment-tokens", request, request_id).await
    }

    pub async fn create_order(
        &self,
        request: &CreateOrderRequest,
        request_id: &str,
    ) -> Result<Order, GatewayError> {
        self.post("/v2/checkout/orders", request, request_id).await
    }

    pub async fn capture_order(&self, order_id: &str, request_id: &str) -> Result<Order, GatewayError> {
        let path = format!("/v2/checkout/orders/{}/capture", order_id);
        self.post(&path, &serde_json::json!({}), request_id).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, GatewayError> {
        let path = format!("/v2/checkout/orders/{}", order_id);
        let token = self.access_token().await?;
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        self.handle_response(response).await
    }

    /// POST with a fresh bearer token and an idempotency key
    async fn post<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
        request_id: &str,
    ) -> Result<T, GatewayError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .header("PayPal-Request-Id", request_id)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::ParseError(e.to_string()))
        } else {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            Err(GatewayError::ApiError {
                status_code: status.as_u16(),
                message: error_body,
            })
        }
    }
}
