//! # Ledger
//!
//! The persistent store of payment, campaign and onboarding records and the
//! only state shared between requests. Nothing above this layer caches a
//! payment or campaign status; every decision re-reads the Ledger.
//!
//! ## Implementations
//!
//! - **PgLedger**: Postgres via sqlx (production)
//! - **InMemoryLedger**: map-backed, for tests and local development
//!
//! Selected at startup by `LEDGER_TYPE` (`postgres` | `inmemory`).
//!
//! ## Conditional writes
//!
//! Status changes and campaign admission are expressed as conditional
//! primitives so concurrent requests cannot overwrite each other:
//! - [`Ledger::transition_payment`] only applies when the stored status
//!   still equals the expected source status.
//! - [`Ledger::insert_campaign_if_idle`] inserts only when the user has no
//!   pending or processing campaign, atomically with the check.

mod inmemory;
mod postgres;

pub use inmemory::InMemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use crate::models::{
    CampaignRecord, CampaignStatus, OnboardingPayment, PaymentRecord, PaymentStatus,
    PaymentTransition,
};

/// Errors that can occur during ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order reference already exists: {0}")]
    DuplicateOrderRef(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(Uuid),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of a conditional campaign insert
#[derive(Debug, Clone, PartialEq)]
pub enum CampaignAdmission {
    /// The record was stored
    Admitted(CampaignRecord),
    /// The user already has this active campaign; nothing was stored
    Conflict(CampaignRecord),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Store a new payment. Fails with `DuplicateOrderRef` if the order
    /// reference is taken.
    async fn insert_payment(&self, record: &PaymentRecord) -> LedgerResult<()>;

    async fn get_payment(&self, id: Uuid) -> LedgerResult<Option<PaymentRecord>>;

    async fn find_payment_by_order_ref(&self, order_ref: &str)
        -> LedgerResult<Option<PaymentRecord>>;

    /// Apply `transition` if the payment is currently in `from`.
    ///
    /// Returns the updated record, or `None` when the stored status no longer
    /// matches (another writer got there first). Metadata is merged, the
    /// transaction reference is only overwritten when one is supplied, and
    /// `paid_at` is stamped on completion. The amount is never touched.
    async fn transition_payment(
        &self,
        id: Uuid,
        from: PaymentStatus,
        transition: &PaymentTransition,
    ) -> LedgerResult<Option<PaymentRecord>>;

    /// Merge keys into a payment's metadata without changing its status
    async fn merge_payment_metadata(
        &self,
        id: Uuid,
        metadata: &JsonValue,
    ) -> LedgerResult<PaymentRecord>;

    /// Insert or replace the onboarding payment details for a user
    async fn upsert_onboarding_payment(&self, progress: &OnboardingPayment) -> LedgerResult<()>;

    async fn get_onboarding_payment(&self, user_id: &str)
        -> LedgerResult<Option<OnboardingPayment>>;

    /// Campaigns in `pending` or `processing` for a user
    async fn active_campaigns(&self, user_id: &str) -> LedgerResult<Vec<CampaignRecord>>;

    /// Insert a campaign unless the user already has an active one
    async fn insert_campaign_if_idle(&self, record: &CampaignRecord)
        -> LedgerResult<CampaignAdmission>;

    async fn update_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> LedgerResult<CampaignRecord>;

    /// Readiness probe
    async fn ping(&self) -> LedgerResult<()>;
}

impl fmt::Debug for dyn Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ledger")
    }
}

/// Shallow merge of `patch` into `base`; non-object values are replaced
pub(crate) fn merge_json(base: &mut JsonValue, patch: &JsonValue) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(base_map), Some(patch_map)) => {
            for (key, value) in patch_map {
                base_map.insert(key.clone(), value.clone());
            }
        }
        (_, Some(_)) => *base = patch.clone(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_overwrites_and_keeps_keys() {
        let mut base = json!({"a": 1, "b": 2});
        merge_json(&mut base, &json!({"b": 3, "c": 4}));
        assert_eq!(base, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_json_replaces_non_object_base() {
        let mut base = JsonValue::Null;
        merge_json(&mut base, &json!({"a": 1}));
        assert_eq!(base, json!({"a": 1}));
    }
}
