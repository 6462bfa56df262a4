//! Postgres implementation of the Ledger trait

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CampaignAdmission, Ledger, LedgerError, LedgerResult};
use crate::models::{
    CampaignRecord, CampaignStatus, OnboardingPayment, PaymentRecord, PaymentStatus,
    PaymentTransition,
};

const PAYMENT_COLUMNS: &str = "id, user_id, plan, amount, currency, provider, status, order_ref, \
     transaction_ref, metadata, created_at, paid_at, updated_at";

const CAMPAIGN_COLUMNS: &str = "id, user_id, title, keywords, platform, job_limit, status, cv_ref, \
     cover_letter_ref, location, cities, experience_years, freshness_days, created_at, updated_at";

/// How many times admission re-reads after losing an insert race to a
/// campaign that finished before it could be read back
const ADMISSION_ATTEMPTS: usize = 3;

/// Ledger implementation over a Postgres pool
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn first_active_campaign(&self, user_id: &str) -> LedgerResult<Option<CampaignRecord>> {
        let query = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
             WHERE user_id = $1 AND status IN ('pending', 'processing') \
             ORDER BY created_at ASC LIMIT 1"
        );
        let record = sqlx::query_as::<_, CampaignRecord>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn insert_payment(&self, record: &PaymentRecord) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, plan, amount, currency, provider, status, order_ref,
                transaction_ref, metadata, created_at, paid_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.plan)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.provider)
        .bind(record.status)
        .bind(&record.order_ref)
        .bind(&record.transaction_ref)
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.paid_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(LedgerError::DuplicateOrderRef(record.order_ref.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_payment(&self, id: Uuid) -> LedgerResult<Option<PaymentRecord>> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_payment_by_order_ref(
        &self,
        order_ref: &str,
    ) -> LedgerResult<Option<PaymentRecord>> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_ref = $1");
        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(order_ref)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: PaymentStatus,
        transition: &PaymentTransition,
    ) -> LedgerResult<Option<PaymentRecord>> {
        let query = format!(
            r#"
            UPDATE payments
            SET status = $3,
                transaction_ref = COALESCE($4, transaction_ref),
                metadata = metadata || $5::jsonb,
                paid_at = CASE WHEN $3 = 'completed'::payment_status THEN NOW() ELSE paid_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(id)
            .bind(from)
            .bind(transition.status)
            .bind(&transition.transaction_ref)
            .bind(&transition.metadata)
            .fetch_optional(&self.pool)
            .await?;

        if updated.is_none() && self.get_payment(id).await?.is_none() {
            return Err(LedgerError::PaymentNotFound(id));
        }

        Ok(updated)
    }

    async fn merge_payment_metadata(
        &self,
        id: Uuid,
        metadata: &JsonValue,
    ) -> LedgerResult<PaymentRecord> {
        let query = format!(
            "UPDATE payments SET metadata = metadata || $2::jsonb, updated_at = NOW() \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        );
        sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(id)
            .bind(metadata)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::PaymentNotFound(id))
    }

    async fn upsert_onboarding_payment(&self, progress: &OnboardingPayment) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO onboarding_payments (
                user_id, plan, amount, currency, transaction_ref,
                payment_method, payment_completed, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                transaction_ref = EXCLUDED.transaction_ref,
                payment_method = EXCLUDED.payment_method,
                payment_completed = EXCLUDED.payment_completed,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&progress.user_id)
        .bind(&progress.plan)
        .bind(progress.amount)
        .bind(&progress.currency)
        .bind(&progress.transaction_ref)
        .bind(&progress.payment_method)
        .bind(progress.payment_completed)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_onboarding_payment(
        &self,
        user_id: &str,
    ) -> LedgerResult<Option<OnboardingPayment>> {
        let record = sqlx::query_as::<_, OnboardingPayment>(
            r#"
            SELECT user_id, plan, amount, currency, transaction_ref,
                   payment_method, payment_completed, updated_at
            FROM onboarding_payments
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn active_campaigns(&self, user_id: &str) -> LedgerResult<Vec<CampaignRecord>> {
        let query = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
             WHERE user_id = $1 AND status IN ('pending', 'processing') \
             ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, CampaignRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn insert_campaign_if_idle(
        &self,
        record: &CampaignRecord,
    ) -> LedgerResult<CampaignAdmission> {
        let query = format!(
            r#"
            INSERT INTO campaigns (
                id, user_id, title, keywords, platform, job_limit, status, cv_ref,
                cover_letter_ref, location, cities, experience_years, freshness_days,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (user_id) WHERE status IN ('pending', 'processing') DO NOTHING
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        );

        for _ in 0..ADMISSION_ATTEMPTS {
            let inserted = sqlx::query_as::<_, CampaignRecord>(&query)
                .bind(record.id)
                .bind(&record.user_id)
                .bind(&record.title)
                .bind(&record.keywords)
                .bind(record.platform)
                .bind(record.job_limit)
                .bind(record.status)
                .bind(&record.cv_ref)
                .bind(&record.cover_letter_ref)
                .bind(&record.location)
                .bind(Json(&record.cities))
                .bind(record.experience_years)
                .bind(record.freshness_days)
                .bind(record.created_at)
                .bind(record.updated_at)
                .fetch_optional(&self.pool)
                .await?;

            if let Some(inserted) = inserted {
                return Ok(CampaignAdmission::Admitted(inserted));
            }

            if let Some(existing) = self.first_active_campaign(&record.user_id).await? {
                return Ok(CampaignAdmission::Conflict(existing));
            }

            tracing::debug!(
                user_id = %record.user_id,
                "Blocking campaign finished before it could be read, retrying admission"
            );
        }

        Err(LedgerError::Unavailable(format!(
            "campaign admission for user {} did not settle",
            record.user_id
        )))
    }

    async fn update_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> LedgerResult<CampaignRecord> {
        let query = format!(
            "UPDATE campaigns SET status = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {CAMPAIGN_COLUMNS}"
        );
        sqlx::query_as::<_, CampaignRecord>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::CampaignNotFound(id))
    }

    async fn ping(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
