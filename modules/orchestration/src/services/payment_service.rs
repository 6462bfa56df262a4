//! Payment reconciliation
//!
//! Owns the payment record lifecycle: stores initiated payments, applies
//! provider callbacks, drives the vault steps on explicit client calls and
//! performs the lazy abandonment check during verification.
//!
//! Every status change goes through `Ledger::transition_payment` with
//! `pending` as the expected source state. When that conditional write
//! loses, the current record is re-read and reported instead.

use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use crate::gateways::vault::STEP_CREATE_PAYMENT_TOKEN;
use crate::gateways::{GatewayError, GatewayRegistry, PaymentGateway, Settlement, VaultGateway};
use crate::ledger::{merge_json, Ledger, LedgerError};
use crate::models::{
    CallbackResponse, CaptureOrderRequest, InitiatePaymentRequest, InitiatePaymentResponse,
    OnboardingPayment, PaymentRecord, PaymentStatus, PaymentTokenRequest, PaymentTokenResponse,
    PaymentTransition, Provider, VerifyPaymentResponse,
};
use crate::validation::{validate_initiate_payment, ValidationError};

/// A pending payment older than this is abandoned on its next verification
pub const ABANDON_AFTER_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Payment {0} is not a {1} payment")]
    ProviderMismatch(Uuid, Provider),

    #[error("Payment {0} is already {1}")]
    AlreadySettled(Uuid, PaymentStatus),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Payment not found: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl From<LedgerError> for PaymentError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::PaymentNotFound(id) => PaymentError::NotFound(id.to_string()),
            other => PaymentError::Ledger(other),
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::ConfigError(message) => PaymentError::Configuration(message),
            GatewayError::Ledger(e) => e.into(),
            e if e.is_invalid_callback() => PaymentError::InvalidCallback(e.to_string()),
            e => PaymentError::Provider(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    ledger: Arc<dyn Ledger>,
    gateways: GatewayRegistry,
    vault: Option<Arc<VaultGateway>>,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        gateways: GatewayRegistry,
        vault: Option<Arc<VaultGateway>>,
    ) -> Self {
        Self {
            ledger,
            gateways,
            vault,
        }
    }

    /// Providers that can currently take payments
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers = self.gateways.providers();
        providers.sort_by_key(|provider| provider.as_str());
        providers
    }

    fn gateway(&self, provider: Provider) -> PaymentResult<Arc<dyn PaymentGateway>> {
        self.gateways.get(provider).ok_or_else(|| {
            PaymentError::Configuration(format!("payment provider {} is not configured", provider))
        })
    }

    fn vault(&self) -> PaymentResult<&VaultGateway> {
        self.vault.as_deref().ok_or_else(|| {
            PaymentError::Configuration(format!(
                "payment provider {} is not configured",
                Provider::GatewayB
            ))
        })
    }

    async fn load(&self, payment_id: Uuid) -> PaymentResult<PaymentRecord> {
        self.ledger
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(payment_id.to_string()))
    }

    /// Start a payment with the requested provider.
    ///
    /// Provider calls happen first; exactly one `pending` record is stored
    /// once they succeed, none when they fail.
    pub async fn initiate_payment(
        &self,
        request: &InitiatePaymentRequest,
    ) -> PaymentResult<InitiatePaymentResponse> {
        validate_initiate_payment(request)?;
        let gateway = self.gateway(request.provider)?;

        let initiation = gateway.initiate(request).await?;
        self.ledger.insert_payment(&initiation.record).await?;

        tracing::info!(
            payment_id = %initiation.record.id,
            order_ref = %initiation.record.order_ref,
            provider = %request.provider,
            user_id = %request.user_id,
            amount = %request.amount,
            plan = %request.plan,
            "Payment initiated"
        );

        Ok(InitiatePaymentResponse {
            payment_id: initiation.record.id,
            order_ref: initiation.record.order_ref,
            provider_init_payload: initiation.init_payload,
        })
    }

    /// Apply a provider callback.
    ///
    /// A callback for a payment that already reached a terminal state is
    /// answered with the stored status. The only side effect is finishing an
    /// onboarding unlock that did not land when the payment completed.
    pub async fn handle_provider_callback(
        &self,
        provider: Provider,
        raw: &JsonValue,
    ) -> PaymentResult<CallbackResponse> {
        let gateway = self.gateway(provider)?;
        let callback = gateway.parse_callback(raw)?;

        let record = self.load(callback.payment_id).await?;
        if record.provider != provider {
            return Err(PaymentError::ProviderMismatch(record.id, provider));
        }
        if let Some(user_id) = &callback.user_id {
            if user_id != &record.user_id {
                return Err(PaymentError::InvalidCallback(format!(
                    "callback user does not own payment {}",
                    record.id
                )));
            }
        }

        if record.status.is_terminal() {
            tracing::info!(
                payment_id = %record.id,
                status = %record.status,
                "Payment already settled, ignoring callback"
            );
            self.ensure_onboarding(&record).await?;
            return Ok(CallbackResponse {
                payment_id: record.id,
                status: record.status,
            });
        }

        let settlement = gateway.apply_callback(&record, &callback).await?;
        let record = self.settle(&record, settlement).await?;

        Ok(CallbackResponse {
            payment_id: record.id,
            status: record.status,
        })
    }

    /// Exchange an approved setup token for a payment token (gateway B).
    ///
    /// A provider failure settles the payment as `failed`.
    pub async fn create_payment_token(
        &self,
        request: &PaymentTokenRequest,
    ) -> PaymentResult<PaymentTokenResponse> {
        let vault = self.vault()?;
        if request.setup_token_id.trim().is_empty() {
            return Err(ValidationError::MissingField("setup_token_id").into());
        }

        let record = self.pending_vault_payment(request.payment_id).await?;

        match vault
            .create_payment_token(request.setup_token_id.trim(), record.id)
            .await
        {
            Ok(payment_token_id) => Ok(PaymentTokenResponse {
                payment_id: record.id,
                payment_token_id,
            }),
            Err(e) if e.is_ledger_error() => Err(e.into()),
            Err(e) => {
                let metadata = e.diagnostics(STEP_CREATE_PAYMENT_TOKEN);
                self.settle(&record, Settlement::Failed { metadata }).await?;
                Err(PaymentError::Provider(e.to_string()))
            }
        }
    }

    /// Create and capture the order for a vaulted payment (gateway B).
    ///
    /// Settles the payment either way and reports the resulting status; an
    /// already settled payment is reported without contacting the provider.
    pub async fn force_capture(
        &self,
        request: &CaptureOrderRequest,
    ) -> PaymentResult<CallbackResponse> {
        let vault = self.vault()?;
        let record = self.load(request.payment_id).await?;
        if record.provider != Provider::GatewayB {
            return Err(PaymentError::ProviderMismatch(record.id, Provider::GatewayB));
        }
        if record.status.is_terminal() {
            self.ensure_onboarding(&record).await?;
            return Ok(CallbackResponse {
                payment_id: record.id,
                status: record.status,
            });
        }

        if let Some(amount) = request.amount {
            if amount != record.amount {
                return Err(ValidationError::AmountMismatch {
                    expected: record.amount,
                    given: amount,
                }
                .into());
            }
        }
        if let Some(currency) = &request.currency {
            if !currency.eq_ignore_ascii_case(&record.currency) {
                return Err(ValidationError::CurrencyMismatch {
                    expected: record.currency.clone(),
                    given: currency.clone(),
                }
                .into());
            }
        }

        let payment_token_id = request
            .payment_token_id
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| record.metadata_str("payment_token_id").map(str::to_string))
            .ok_or(ValidationError::MissingField("payment_token_id"))?;

        let settlement = vault.capture_settlement(&record, &payment_token_id).await?;
        let record = self.settle(&record, settlement).await?;

        Ok(CallbackResponse {
            payment_id: record.id,
            status: record.status,
        })
    }

    /// Look up a payment by id or order reference.
    ///
    /// A pending payment is first checked with its provider, then abandoned
    /// if it is older than the abandonment window.
    pub async fn verify_payment(&self, reference: &str) -> PaymentResult<VerifyPaymentResponse> {
        let reference = reference.trim();
        let mut record = match Uuid::parse_str(reference) {
            Ok(id) => self.ledger.get_payment(id).await?,
            Err(_) => self.ledger.find_payment_by_order_ref(reference).await?,
        }
        .ok_or_else(|| PaymentError::NotFound(reference.to_string()))?;

        if record.status == PaymentStatus::Pending {
            if let Some(gateway) = self.gateways.get(record.provider) {
                match gateway.verify(&record).await {
                    Ok(Some(settlement)) => record = self.settle(&record, settlement).await?,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            payment_id = %record.id,
                            error = %e,
                            "Provider status lookup failed, keeping stored status"
                        );
                    }
                }
            }
        }

        let record = self.sweep_abandoned(&record).await?;
        self.ensure_onboarding(&record).await?;
        Ok(VerifyPaymentResponse::from(&record))
    }

    /// Abandon a payment left `pending` past the abandonment window.
    ///
    /// Conditional on the stored status still being `pending`, so a
    /// completion that landed concurrently is never demoted.
    pub async fn sweep_abandoned(&self, record: &PaymentRecord) -> PaymentResult<PaymentRecord> {
        if record.status != PaymentStatus::Pending
            || Utc::now() - record.created_at <= Duration::minutes(ABANDON_AFTER_MINUTES)
        {
            return Ok(record.clone());
        }

        let transition = PaymentTransition::to(PaymentStatus::Abandoned).with_metadata(json!({
            "abandoned_reason": format!(
                "no provider confirmation within {} minutes",
                ABANDON_AFTER_MINUTES
            ),
        }));

        match self
            .ledger
            .transition_payment(record.id, PaymentStatus::Pending, &transition)
            .await?
        {
            Some(abandoned) => {
                tracing::info!(
                    payment_id = %abandoned.id,
                    order_ref = %abandoned.order_ref,
                    "Payment abandoned"
                );
                Ok(abandoned)
            }
            None => self.load(record.id).await,
        }
    }

    async fn pending_vault_payment(&self, payment_id: Uuid) -> PaymentResult<PaymentRecord> {
        let record = self.load(payment_id).await?;
        if record.provider != Provider::GatewayB {
            return Err(PaymentError::ProviderMismatch(record.id, Provider::GatewayB));
        }
        if record.status.is_terminal() {
            return Err(PaymentError::AlreadySettled(record.id, record.status));
        }
        Ok(record)
    }

    /// Apply a settlement to a pending record
    async fn settle(
        &self,
        record: &PaymentRecord,
        settlement: Settlement,
    ) -> PaymentResult<PaymentRecord> {
        let (transition, payment_method) = match settlement {
            Settlement::Pending => {
                tracing::debug!(payment_id = %record.id, "Provider reports payment still pending");
                return Ok(record.clone());
            }
            Settlement::Completed {
                transaction_ref,
                metadata,
                payment_method,
            } => {
                let mut metadata = metadata;
                merge_json(&mut metadata, &json!({ "payment_method": payment_method }));
                (
                    PaymentTransition::to(PaymentStatus::Completed)
                        .with_transaction_ref(transaction_ref)
                        .with_metadata(metadata),
                    Some(payment_method),
                )
            }
            Settlement::Failed { metadata } => (
                PaymentTransition::to(PaymentStatus::Failed).with_metadata(metadata),
                None,
            ),
        };

        let Some(updated) = self
            .ledger
            .transition_payment(record.id, PaymentStatus::Pending, &transition)
            .await?
        else {
            let current = self.load(record.id).await?;
            tracing::info!(
                payment_id = %record.id,
                status = %current.status,
                "Payment settled concurrently, keeping stored status"
            );
            return Ok(current);
        };

        tracing::info!(
            payment_id = %updated.id,
            order_ref = %updated.order_ref,
            status = %updated.status,
            transaction_ref = ?updated.transaction_ref,
            "Payment settled"
        );

        if let Some(payment_method) = payment_method {
            self.unlock_onboarding(&updated, payment_method).await?;
        }

        Ok(updated)
    }

    /// Unlock onboarding for a completed payment unless already unlocked
    async fn ensure_onboarding(&self, record: &PaymentRecord) -> PaymentResult<()> {
        if record.status != PaymentStatus::Completed {
            return Ok(());
        }
        let unlocked = self
            .ledger
            .get_onboarding_payment(&record.user_id)
            .await?
            .is_some_and(|progress| progress.payment_completed);
        if unlocked {
            return Ok(());
        }

        tracing::warn!(
            payment_id = %record.id,
            user_id = %record.user_id,
            "Completed payment missing onboarding unlock, retrying"
        );
        let payment_method = record
            .metadata
            .get("payment_method")
            .cloned()
            .unwrap_or_else(|| json!({}));
        self.unlock_onboarding(record, payment_method).await
    }

    async fn unlock_onboarding(
        &self,
        record: &PaymentRecord,
        payment_method: JsonValue,
    ) -> PaymentResult<()> {
        let progress = OnboardingPayment {
            user_id: record.user_id.clone(),
            plan: record.plan.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            transaction_ref: record.transaction_ref.clone(),
            payment_method,
            payment_completed: true,
            updated_at: Utc::now(),
        };
        self.ledger.upsert_onboarding_payment(&progress).await?;

        tracing::info!(
            user_id = %record.user_id,
            plan = %record.plan,
            "Onboarding payment step completed"
        );
        Ok(())
    }
}
