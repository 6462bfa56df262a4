//! # Payment Gateway Adapters
//!
//! Each provider sits behind [`PaymentGateway`], so the reconciler drives
//! both protocols through the same `initiate → callback → verify` contract:
//!
//! - **Gateway A** ([`HostedCheckoutGateway`]): session token + hosted SDK,
//!   the provider reports the outcome on a redirect or webhook.
//! - **Gateway B** ([`VaultGateway`]): setup token → payment token → order →
//!   capture, with every step after approval driven from this service.
//!
//! Adapters never write terminal states themselves; they return a
//! [`Settlement`] and the reconciler applies it to the Ledger.

pub mod continuation;
pub mod error;
pub mod hosted_checkout;
pub mod vault;

pub use continuation::{ContinuationCodec, ContinuationToken};
pub use error::GatewayError;
pub use hosted_checkout::{HostedCheckoutConfig, HostedCheckoutGateway};
pub use vault::{VaultConfig, VaultGateway};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{InitiatePaymentRequest, PaymentRecord, Provider};

/// Timeout applied to every outbound provider request
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// A started payment: the pending record to store and what the client needs
/// to continue with the provider
#[derive(Debug, Clone)]
pub struct Initiation {
    pub record: PaymentRecord,
    pub init_payload: JsonValue,
}

/// Outcome a provider reported for a hosted checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedStatus {
    Approved,
    Pending,
    Declined(String),
}

/// Provider-specific content of a callback
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackKind {
    /// The provider states the result directly (gateway A)
    StatusReport {
        status: ReportedStatus,
        transaction_ref: Option<String>,
        payment_method: JsonValue,
    },
    /// The payer approved a vault setup token (gateway B)
    Approval { setup_token_id: String },
    /// The payer backed out of the approval page (gateway B)
    Cancelled,
}

/// Callback data decoded far enough to find the payment it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCallback {
    pub payment_id: Uuid,
    /// User carried in the continuation token, when the protocol has one
    pub user_id: Option<String>,
    pub kind: CallbackKind,
}

/// What a pending payment should become
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// No definitive answer yet; the record stays pending
    Pending,
    Completed {
        transaction_ref: Option<String>,
        metadata: JsonValue,
        payment_method: JsonValue,
    },
    Failed {
        metadata: JsonValue,
    },
}

/// Common contract for payment providers
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> Provider;

    /// Start a payment with the provider.
    ///
    /// Provider calls happen before the record exists; the caller stores the
    /// returned pending record only when this succeeds.
    async fn initiate(&self, request: &InitiatePaymentRequest) -> Result<Initiation, GatewayError>;

    /// Decode correlation identifiers from raw callback data.
    ///
    /// Pure: no provider calls, no Ledger access.
    fn parse_callback(&self, raw: &JsonValue) -> Result<ProviderCallback, GatewayError>;

    /// Work out the settlement of a pending record for a callback
    async fn apply_callback(
        &self,
        record: &PaymentRecord,
        callback: &ProviderCallback,
    ) -> Result<Settlement, GatewayError>;

    /// Ask the provider about a pending record; `None` when it cannot tell
    async fn verify(&self, record: &PaymentRecord) -> Result<Option<Settlement>, GatewayError>;
}

/// Gateways available to this process, keyed by provider
///
/// A provider without credentials is never registered.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<Provider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        tracing::info!(provider = %gateway.provider(), "Payment gateway registered");
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.gateways.keys().copied().collect()
    }
}

static LAST_ORDER_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Milliseconds since the epoch, strictly increasing within this process
fn next_order_millis() -> i64 {
    loop {
        let now = Utc::now().timestamp_millis();
        let last = LAST_ORDER_MILLIS.load(Ordering::SeqCst);
        let candidate = now.max(last + 1);
        if LAST_ORDER_MILLIS
            .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return candidate;
        }
    }
}

/// Order reference `<PREFIX>-<millis>-<user prefix>`
pub fn generate_order_ref(provider: Provider, user_id: &str) -> String {
    let user_prefix: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    format!("{}-{}-{}", provider.order_prefix(), next_order_millis(), user_prefix)
}

/// Read a string field from a JSON object, trimming empties to `None`
pub(crate) fn json_str(raw: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(|value| match value {
            JsonValue::String(s) => Some(s.trim().to_string()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_ref_format() {
        let order_ref = generate_order_ref(Provider::GatewayA, "u1a2b3c4d5e6");
        let parts: Vec<&str> = order_ref.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "FGC");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], "u1a2b3c4");
    }

    #[test]
    fn test_order_refs_unique_in_tight_loop() {
        let refs: HashSet<String> = (0..1000)
            .map(|_| generate_order_ref(Provider::GatewayB, "user-1"))
            .collect();
        assert_eq!(refs.len(), 1000);
    }

    #[test]
    fn test_order_ref_strips_separators_from_user_prefix() {
        let order_ref = generate_order_ref(Provider::GatewayA, "6f1c-77aa-bb");
        assert!(order_ref.ends_with("-6f1c77aa"));
    }

    #[test]
    fn test_json_str_reads_aliases() {
        let raw = serde_json::json!({"tran_ref": " T1 ", "amount": 5});
        assert_eq!(json_str(&raw, &["transaction_ref", "tran_ref"]), Some("T1".to_string()));
        assert_eq!(json_str(&raw, &["amount"]), Some("5".to_string()));
        assert_eq!(json_str(&raw, &["missing"]), None);
    }
}
