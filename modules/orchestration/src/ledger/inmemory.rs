//! In-memory implementation of the Ledger trait for testing and development

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{merge_json, CampaignAdmission, Ledger, LedgerError, LedgerResult};
use crate::models::{
    CampaignRecord, CampaignStatus, OnboardingPayment, PaymentRecord, PaymentStatus,
    PaymentTransition,
};

#[derive(Default)]
struct State {
    payments: HashMap<Uuid, PaymentRecord>,
    campaigns: HashMap<Uuid, CampaignRecord>,
    onboarding: HashMap<String, OnboardingPayment>,
}

/// Ledger implementation holding every record in process memory
///
/// A single lock guards all collections, so each trait method is atomic
/// with respect to the others, including the check-then-insert of
/// campaign admission.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored payments
    pub fn payment_count(&self) -> usize {
        self.lock().payments.len()
    }

    /// Number of stored campaigns
    pub fn campaign_count(&self) -> usize {
        self.lock().campaigns.len()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn insert_payment(&self, record: &PaymentRecord) -> LedgerResult<()> {
        let mut state = self.lock();
        if state.payments.values().any(|p| p.order_ref == record.order_ref) {
            return Err(LedgerError::DuplicateOrderRef(record.order_ref.clone()));
        }
        state.payments.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> LedgerResult<Option<PaymentRecord>> {
        Ok(self.lock().payments.get(&id).cloned())
    }

    async fn find_payment_by_order_ref(
        &self,
        order_ref: &str,
    ) -> LedgerResult<Option<PaymentRecord>> {
        Ok(self
            .lock()
            .payments
            .values()
            .find(|p| p.order_ref == order_ref)
            .cloned())
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: PaymentStatus,
        transition: &PaymentTransition,
    ) -> LedgerResult<Option<PaymentRecord>> {
        let mut state = self.lock();
        let record = state
            .payments
            .get_mut(&id)
            .ok_or(LedgerError::PaymentNotFound(id))?;

        if record.status != from {
            return Ok(None);
        }

        let now = Utc::now();
        record.status = transition.status;
        if transition.transaction_ref.is_some() {
            record.transaction_ref = transition.transaction_ref.clone();
        }
        merge_json(&mut record.metadata, &transition.metadata);
        if transition.status == PaymentStatus::Completed {
            record.paid_at = Some(now);
        }
        record.updated_at = now;

        Ok(Some(record.clone()))
    }

    async fn merge_payment_metadata(
        &self,
        id: Uuid,
        metadata: &JsonValue,
    ) -> LedgerResult<PaymentRecord> {
        let mut state = self.lock();
        let record = state
            .payments
            .get_mut(&id)
            .ok_or(LedgerError::PaymentNotFound(id))?;
        merge_json(&mut record.metadata, metadata);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn upsert_onboarding_payment(&self, progress: &OnboardingPayment) -> LedgerResult<()> {
        self.lock()
            .onboarding
            .insert(progress.user_id.clone(), progress.clone());
        Ok(())
    }

    async fn get_onboarding_payment(
        &self,
        user_id: &str,
    ) -> LedgerResult<Option<OnboardingPayment>> {
        Ok(self.lock().onboarding.get(user_id).cloned())
    }

    async fn active_campaigns(&self, user_id: &str) -> LedgerResult<Vec<CampaignRecord>> {
        let state = self.lock();
        let mut active: Vec<CampaignRecord> = state
            .campaigns
            .values()
            .filter(|c| c.user_id == user_id && c.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|c| c.created_at);
        Ok(active)
    }

    async fn insert_campaign_if_idle(
        &self,
        record: &CampaignRecord,
    ) -> LedgerResult<CampaignAdmission> {
        let mut state = self.lock();
        if let Some(existing) = state
            .campaigns
            .values()
            .filter(|c| c.user_id == record.user_id && c.status.is_active())
            .min_by_key(|c| c.created_at)
        {
            return Ok(CampaignAdmission::Conflict(existing.clone()));
        }
        state.campaigns.insert(record.id, record.clone());
        Ok(CampaignAdmission::Admitted(record.clone()))
    }

    async fn update_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> LedgerResult<CampaignRecord> {
        let mut state = self.lock();
        let record = state
            .campaigns
            .get_mut(&id)
            .ok_or(LedgerError::CampaignNotFound(id))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn pending_payment(order_ref: &str) -> PaymentRecord {
        PaymentRecord::new_pending(
            Uuid::new_v4(),
            "user-1",
            "gold",
            Decimal::from(699),
            "USD",
            Provider::GatewayA,
            order_ref.to_string(),
            json!({}),
        )
    }

    #[tokio::test]
    async fn test_duplicate_order_ref_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.insert_payment(&pending_payment("FGC-1-user")).await.unwrap();

        let err = ledger
            .insert_payment(&pending_payment("FGC-1-user"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateOrderRef(_)));
        assert_eq!(ledger.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let ledger = InMemoryLedger::new();
        let record = pending_payment("FGC-2-user");
        ledger.insert_payment(&record).await.unwrap();

        let completed = ledger
            .transition_payment(
                record.id,
                PaymentStatus::Pending,
                &PaymentTransition::to(PaymentStatus::Completed)
                    .with_transaction_ref(Some("txn_1".to_string())),
            )
            .await
            .unwrap()
            .expect("first transition applies");
        assert_eq!(completed.status, PaymentStatus::Completed);
        assert!(completed.paid_at.is_some());

        let second = ledger
            .transition_payment(
                record.id,
                PaymentStatus::Pending,
                &PaymentTransition::to(PaymentStatus::Abandoned),
            )
            .await
            .unwrap();
        assert!(second.is_none());

        let stored = ledger.get_payment(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(stored.transaction_ref.as_deref(), Some("txn_1"));
    }

    #[tokio::test]
    async fn test_merge_metadata_keeps_status() {
        let ledger = InMemoryLedger::new();
        let record = pending_payment("FGC-3-user");
        ledger.insert_payment(&record).await.unwrap();

        let updated = ledger
            .merge_payment_metadata(record.id, &json!({"payment_token_id": "tok_1"}))
            .await
            .unwrap();
        assert_eq!(updated.status, PaymentStatus::Pending);
        assert_eq!(updated.metadata_str("payment_token_id"), Some("tok_1"));
    }
}
