//! Gateway B: vault / order / capture
//!
//! 1. `initiate` creates a vault setup token; the payer approves it on the
//!    provider's page and is redirected back with the setup token id
//! 2. The setup token is exchanged for a reusable payment token
//! 3. An order bound to the payment token is created and captured
//!
//! Steps 2 and 3 are driven from this service, either by the approval
//! callback or by explicit client calls. Any failure in them settles the
//! payment as `failed` with the failing step recorded in metadata.

mod client;
pub mod types;

pub use client::VaultClient;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use self::types::{
    CreateOrderRequest, CreatePaymentTokenRequest, CreateSetupTokenRequest, ExperienceContext,
    Money, OrderPaymentSource, PaymentTokenSource, PaypalSetupSource, PurchaseUnitRequest,
    SetupTokenSource, TokenReference, VaultedPaypal,
};
use super::error::GatewayError;
use super::{
    generate_order_ref, json_str, CallbackKind, Initiation, PaymentGateway, ProviderCallback,
    Settlement,
};
use crate::ledger::{Ledger, LedgerError};
use crate::models::{InitiatePaymentRequest, PaymentRecord, Provider};

/// Path of the approval redirect endpoint
pub const CALLBACK_PATH: &str = "/api/payments/callback/gateway-b";

pub const DEFAULT_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

/// Step names recorded as `failed_step` on failed payments
pub const STEP_CREATE_PAYMENT_TOKEN: &str = "create_payment_token";
pub const STEP_CREATE_ORDER: &str = "create_order";
pub const STEP_CAPTURE_ORDER: &str = "capture_order";

/// Configuration for the vault provider
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Absolute URL of this service's approval callback
    pub callback_url: String,
    pub brand_name: Option<String>,
}

impl VaultConfig {
    /// Load configuration from `GATEWAY_B_*` environment variables
    pub fn from_env(public_base_url: &str) -> Result<Self, GatewayError> {
        let client_id = std::env::var("GATEWAY_B_CLIENT_ID")
            .map_err(|_| GatewayError::ConfigError("Missing GATEWAY_B_CLIENT_ID".to_string()))?;
        let client_secret = std::env::var("GATEWAY_B_CLIENT_SECRET").map_err(|_| {
            GatewayError::ConfigError("Missing GATEWAY_B_CLIENT_SECRET".to_string())
        })?;
        let base_url =
            std::env::var("GATEWAY_B_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(VaultConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            callback_url: format!("{}{}", public_base_url.trim_end_matches('/'), CALLBACK_PATH),
            brand_name: std::env::var("GATEWAY_B_BRAND_NAME").ok(),
        })
    }

    fn return_url(&self, payment_id: Uuid) -> String {
        format!("{}?payment_id={}", self.callback_url, payment_id)
    }

    fn cancel_url(&self, payment_id: Uuid) -> String {
        format!("{}?payment_id={}&cancelled=true", self.callback_url, payment_id)
    }
}

/// Result of a successful order capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOrder {
    pub order_id: String,
    pub capture_id: String,
}

/// Provider amounts carry exactly two decimal places
pub fn format_amount(amount: Decimal) -> String {
    let mut value = amount.round_dp(2);
    value.rescale(2);
    value.to_string()
}

/// Gateway B adapter
#[derive(Clone)]
pub struct VaultGateway {
    config: Arc<VaultConfig>,
    client: VaultClient,
    ledger: Arc<dyn Ledger>,
}

impl VaultGateway {
    pub fn new(config: VaultConfig, ledger: Arc<dyn Ledger>) -> Result<Self, GatewayError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(GatewayError::ConfigError(
                "gateway B credentials are empty".to_string(),
            ));
        }

        let config = Arc::new(config);
        let client = VaultClient::new(config.clone())?;

        Ok(Self {
            config,
            client,
            ledger,
        })
    }

    async fn load(&self, payment_id: Uuid) -> Result<PaymentRecord, GatewayError> {
        self.ledger
            .get_payment(payment_id)
            .await?
            .ok_or(GatewayError::Ledger(LedgerError::PaymentNotFound(payment_id)))
    }

    /// Exchange an approved setup token for a reusable payment token and
    /// store its id on the payment
    pub async fn create_payment_token(
        &self,
        setup_token_id: &str,
        payment_id: Uuid,
    ) -> Result<String, GatewayError> {
        let record = self.load(payment_id).await?;

        let request = CreatePaymentTokenRequest {
            payment_source: PaymentTokenSource {
                token: TokenReference {
                    id: setup_token_id.to_string(),
                    token_type: "SETUP_TOKEN",
                },
            },
        };
        let token = self
            .client
            .create_payment_token(&request, &format!("{}-token", record.order_ref))
            .await?;

        self.ledger
            .merge_payment_metadata(
                payment_id,
                &json!({
                    "payment_token_id": token.id,
                    "vault_customer_id": token.customer.as_ref().map(|c| c.id.clone()),
                }),
            )
            .await?;

        tracing::info!(
            payment_id = %payment_id,
            payment_token_id = %token.id,
            "Vault payment token created"
        );

        Ok(token.id)
    }

    /// Create an order bound to the payment token and capture it.
    ///
    /// The order id is stored before capturing so a crash between the two
    /// can be settled later by `verify`.
    pub async fn capture_order(
        &self,
        payment_id: Uuid,
        payment_token_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<CapturedOrder, StepFailure> {
        let record = self
            .load(payment_id)
            .await
            .map_err(StepFailure::at(STEP_CREATE_ORDER))?;

        let request = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnitRequest {
                reference_id: record.order_ref.clone(),
                amount: Money {
                    currency_code: currency.to_ascii_uppercase(),
                    value: format_amount(amount),
                },
            }],
            payment_source: OrderPaymentSource {
                paypal: VaultedPaypal {
                    vault_id: payment_token_id.to_string(),
                },
            },
        };

        let order = self
            .client
            .create_order(&request, &record.order_ref)
            .await
            .map_err(StepFailure::at(STEP_CREATE_ORDER))?;

        self.ledger
            .merge_payment_metadata(payment_id, &json!({ "order_id": order.id }))
            .await
            .map_err(|e| StepFailure::at(STEP_CREATE_ORDER)(e.into()))?;

        let captured = match order.first_capture() {
            Some(_) => order,
            None => self
                .client
                .capture_order(&order.id, &format!("{}-capture", record.order_ref))
                .await
                .map_err(StepFailure::at(STEP_CAPTURE_ORDER))?,
        };

        let capture = captured.first_capture().ok_or_else(|| StepFailure {
            step: STEP_CAPTURE_ORDER,
            error: GatewayError::ParseError(format!("order {} has no capture", captured.id)),
        })?;

        if let Some(status) = capture.status.as_deref() {
            if matches!(status.to_ascii_uppercase().as_str(), "DECLINED" | "FAILED") {
                return Err(StepFailure {
                    step: STEP_CAPTURE_ORDER,
                    error: GatewayError::Declined(format!("capture {} is {}", capture.id, status)),
                });
            }
        }

        tracing::info!(
            payment_id = %payment_id,
            order_id = %captured.id,
            capture_id = %capture.id,
            "Vault order captured"
        );

        Ok(CapturedOrder {
            order_id: captured.id.clone(),
            capture_id: capture.id.clone(),
        })
    }

    /// Run the capture step and express its outcome as a settlement.
    ///
    /// Provider failures become `Settlement::Failed`; storage failures are
    /// returned as errors because nothing is known about the provider side.
    pub async fn capture_settlement(
        &self,
        record: &PaymentRecord,
        payment_token_id: &str,
    ) -> Result<Settlement, GatewayError> {
        match self
            .capture_order(record.id, payment_token_id, record.amount, &record.currency)
            .await
        {
            Ok(captured) => Ok(completed(captured, payment_token_id)),
            Err(failure) if failure.error.is_ledger_error() => Err(failure.error),
            Err(failure) => Ok(failure.settlement()),
        }
    }
}

/// A gateway error tagged with the flow step that produced it
#[derive(Debug)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: GatewayError,
}

impl StepFailure {
    fn at(step: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |error| Self { step, error }
    }

    /// Failed settlement carrying the step, the error and the provider body
    pub fn settlement(&self) -> Settlement {
        Settlement::Failed {
            metadata: self.error.diagnostics(self.step),
        }
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.step, self.error)
    }
}

fn completed(captured: CapturedOrder, payment_token_id: &str) -> Settlement {
    Settlement::Completed {
        transaction_ref: Some(captured.capture_id.clone()),
        metadata: json!({
            "capture_id": captured.capture_id,
            "order_id": captured.order_id,
            "payment_token_id": payment_token_id,
        }),
        payment_method: json!({
            "provider": Provider::GatewayB.as_str(),
            "method": "paypal",
            "payment_token_id": payment_token_id,
        }),
    }
}

#[async_trait]
impl PaymentGateway for VaultGateway {
    fn provider(&self) -> Provider {
        Provider::GatewayB
    }

    async fn initiate(&self, request: &InitiatePaymentRequest) -> Result<Initiation, GatewayError> {
        let payment_id = Uuid::new_v4();
        let order_ref = generate_order_ref(Provider::GatewayB, &request.user_id);
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| "USD".to_string())
            .to_ascii_uppercase();

        let setup_request = CreateSetupTokenRequest {
            payment_source: SetupTokenSource {
                paypal: PaypalSetupSource {
                    usage_type: "MERCHANT",
                    experience_context: ExperienceContext {
                        return_url: self.config.return_url(payment_id),
                        cancel_url: self.config.cancel_url(payment_id),
                        brand_name: self.config.brand_name.clone(),
                    },
                },
            },
        };
        let setup_token = self
            .client
            .create_setup_token(&setup_request, &format!("{}-setup", order_ref))
            .await?;

        let approve_url = setup_token.approve_url().map(str::to_string);

        let init_payload = json!({
            "setup_token_id": setup_token.id,
            "approve_url": approve_url,
            "order_reference": order_ref,
        });

        let record = PaymentRecord::new_pending(
            payment_id,
            &request.user_id,
            &request.plan,
            request.amount,
            &currency,
            Provider::GatewayB,
            order_ref,
            json!({
                "setup_token_id": setup_token.id,
                "billing_email": request.billing.email,
            }),
        );

        tracing::info!(
            payment_id = %payment_id,
            order_ref = %record.order_ref,
            setup_token_id = %setup_token.id,
            "Vault setup token created"
        );

        Ok(Initiation { record, init_payload })
    }

    fn parse_callback(&self, raw: &JsonValue) -> Result<ProviderCallback, GatewayError> {
        let payment_id = json_str(raw, &["payment_id"])
            .ok_or_else(|| GatewayError::InvalidCallback("missing payment_id".to_string()))?;
        let payment_id = Uuid::parse_str(&payment_id)
            .map_err(|_| GatewayError::InvalidCallback(format!("invalid payment_id: {payment_id}")))?;

        let cancelled = json_str(raw, &["cancelled"])
            .is_some_and(|flag| flag.eq_ignore_ascii_case("true"));
        if cancelled {
            return Ok(ProviderCallback {
                payment_id,
                user_id: None,
                kind: CallbackKind::Cancelled,
            });
        }

        let setup_token_id = json_str(raw, &["approval_token_id", "setup_token_id"])
            .ok_or_else(|| GatewayError::InvalidCallback("missing approval_token_id".to_string()))?;

        Ok(ProviderCallback {
            payment_id,
            user_id: None,
            kind: CallbackKind::Approval { setup_token_id },
        })
    }

    async fn apply_callback(
        &self,
        record: &PaymentRecord,
        callback: &ProviderCallback,
    ) -> Result<Settlement, GatewayError> {
        let setup_token_id = match &callback.kind {
            CallbackKind::Approval { setup_token_id } => setup_token_id,
            CallbackKind::Cancelled => {
                tracing::info!(payment_id = %record.id, "Payer cancelled vault approval");
                return Ok(Settlement::Failed {
                    metadata: json!({
                        "failed_step": "approval",
                        "error": "payer cancelled the approval",
                    }),
                });
            }
            CallbackKind::StatusReport { .. } => {
                return Err(GatewayError::InvalidCallback(
                    "gateway B callbacks carry an approval token".to_string(),
                ));
            }
        };

        if let Some(expected) = record.metadata_str("setup_token_id") {
            if expected != setup_token_id {
                return Err(GatewayError::InvalidCallback(format!(
                    "approval token {} does not belong to payment {}",
                    setup_token_id, record.id
                )));
            }
        }

        let payment_token_id = match self.create_payment_token(setup_token_id, record.id).await {
            Ok(id) => id,
            Err(e) if e.is_ledger_error() => return Err(e),
            Err(e) => {
                tracing::warn!(payment_id = %record.id, error = %e, "Payment token step failed");
                return Ok(StepFailure::at(STEP_CREATE_PAYMENT_TOKEN)(e).settlement());
            }
        };

        let settlement = self.capture_settlement(record, &payment_token_id).await?;
        if let Settlement::Failed { metadata } = &settlement {
            tracing::warn!(
                payment_id = %record.id,
                failed_step = %metadata["failed_step"],
                "Vault capture failed"
            );
        }
        Ok(settlement)
    }

    async fn verify(&self, record: &PaymentRecord) -> Result<Option<Settlement>, GatewayError> {
        let Some(order_id) = record.metadata_str("order_id") else {
            return Ok(None);
        };

        let order = self.client.get_order(order_id).await?;
        let status = order.status.clone().unwrap_or_default().to_ascii_uppercase();

        let settlement = match (order.first_capture(), status.as_str()) {
            (Some(capture), "COMPLETED") => Some(completed(
                CapturedOrder {
                    order_id: order.id.clone(),
                    capture_id: capture.id.clone(),
                },
                record.metadata_str("payment_token_id").unwrap_or_default(),
            )),
            (_, "VOIDED") => Some(Settlement::Failed {
                metadata: json!({
                    "failed_step": STEP_CAPTURE_ORDER,
                    "error": "order voided",
                    "provider_status": status,
                }),
            }),
            _ => None,
        };

        tracing::debug!(
            payment_id = %record.id,
            order_id = %order_id,
            order_status = %status,
            settled = settlement.is_some(),
            "Vault order looked up"
        );

        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use std::str::FromStr;

    fn gateway() -> VaultGateway {
        VaultGateway::new(
            VaultConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                callback_url: format!("http://localhost:8080{}", CALLBACK_PATH),
                brand_name: None,
            },
            Arc::new(InMemoryLedger::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_amount_has_two_decimals() {
        assert_eq!(format_amount(Decimal::from(699)), "699.00");
        assert_eq!(format_amount(Decimal::from_str("12.5").unwrap()), "12.50");
        assert_eq!(format_amount(Decimal::from_str("9.999").unwrap()), "10.00");
    }

    #[test]
    fn test_parse_approval_callback() {
        let payment_id = Uuid::new_v4();
        let callback = gateway()
            .parse_callback(&json!({
                "payment_id": payment_id.to_string(),
                "approval_token_id": "SETUP-1",
            }))
            .unwrap();
        assert_eq!(callback.payment_id, payment_id);
        assert_eq!(
            callback.kind,
            CallbackKind::Approval { setup_token_id: "SETUP-1".to_string() }
        );
    }

    #[test]
    fn test_parse_cancel_callback() {
        let payment_id = Uuid::new_v4();
        let callback = gateway()
            .parse_callback(&json!({
                "payment_id": payment_id.to_string(),
                "cancelled": "true",
            }))
            .unwrap();
        assert_eq!(callback.kind, CallbackKind::Cancelled);
    }

    #[test]
    fn test_malformed_payment_id_rejected() {
        let err = gateway()
            .parse_callback(&json!({"payment_id": "not-a-uuid", "approval_token_id": "S"}))
            .unwrap_err();
        assert!(err.is_invalid_callback());
    }

    #[test]
    fn test_step_failure_settlement_keeps_provider_body() {
        let failure = StepFailure::at(STEP_CREATE_ORDER)(GatewayError::ApiError {
            status_code: 422,
            message: r#"{"name":"UNPROCESSABLE_ENTITY"}"#.to_string(),
        });
        let Settlement::Failed { metadata } = failure.settlement() else {
            panic!("expected failed settlement");
        };
        assert_eq!(metadata["failed_step"], STEP_CREATE_ORDER);
        assert_eq!(metadata["provider_status"], 422);
        assert_eq!(metadata["provider_body"]["name"], "UNPROCESSABLE_ENTITY");
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let result = VaultGateway::new(
            VaultConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                callback_url: String::new(),
                brand_name: None,
            },
            Arc::new(InMemoryLedger::new()),
        );
        assert!(matches!(result, Err(GatewayError::ConfigError(_))));
    }
}
