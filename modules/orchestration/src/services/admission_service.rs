//! Campaign admission control
//!
//! A user may have at most one campaign in `pending` or `processing`. The
//! check and the insert are a single conditional Ledger write, so two
//! concurrent requests for the same user admit exactly one campaign.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::{CampaignAdmission, Ledger, LedgerError};
use crate::locations::resolve_cities;
use crate::models::{CampaignRecord, CampaignRequest, CampaignStatus};
use crate::scraper::{ScraperClient, ScraperError};
use crate::validation::{validate_campaign_request, ValidationError, DEFAULT_JOB_LIMIT};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Carries the campaign that is still running
    #[error("User already has an active campaign: {}", .0.id)]
    Conflict(Box<CampaignRecord>),

    #[error("Scraper error: {0}")]
    Provider(#[from] ScraperError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type AdmissionResult<T> = Result<T, AdmissionError>;

#[derive(Clone)]
pub struct AdmissionService {
    ledger: Arc<dyn Ledger>,
    scraper: Option<ScraperClient>,
}

impl AdmissionService {
    pub fn new(ledger: Arc<dyn Ledger>, scraper: Option<ScraperClient>) -> Self {
        Self { ledger, scraper }
    }

    /// Admit a campaign for the requesting user.
    ///
    /// Rejected with the blocking record when the user already has an
    /// active campaign. An admitted campaign that cannot be forwarded to the
    /// scraper is marked `failed` so it does not block the user.
    pub async fn request_campaign(&self, request: &CampaignRequest) -> AdmissionResult<CampaignRecord> {
        let platform = validate_campaign_request(request)?;

        let cities = if platform.uses_coded_cities() {
            resolve_cities(&request.cities)
        } else {
            Vec::new()
        };

        let now = Utc::now();
        let record = CampaignRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id.trim().to_string(),
            title: request.title.trim().to_string(),
            keywords: request.keywords.trim().to_string(),
            platform,
            job_limit: request.job_limit.unwrap_or(DEFAULT_JOB_LIMIT),
            status: CampaignStatus::Pending,
            cv_ref: request.cv_ref.clone(),
            cover_letter_ref: request.cover_letter_ref.clone(),
            location: if platform.uses_coded_cities() {
                None
            } else {
                request.location.as_ref().map(|l| l.trim().to_string())
            },
            cities,
            experience_years: request.experience_years,
            freshness_days: request.freshness_days,
            created_at: now,
            updated_at: now,
        };

        let campaign = match self.ledger.insert_campaign_if_idle(&record).await? {
            CampaignAdmission::Admitted(campaign) => campaign,
            CampaignAdmission::Conflict(existing) => {
                tracing::info!(
                    user_id = %record.user_id,
                    existing_campaign_id = %existing.id,
                    existing_status = ?existing.status,
                    "Campaign rejected, user already has an active campaign"
                );
                return Err(AdmissionError::Conflict(Box::new(existing)));
            }
        };

        tracing::info!(
            campaign_id = %campaign.id,
            user_id = %campaign.user_id,
            platform = ?campaign.platform,
            job_limit = campaign.job_limit,
            cities = campaign.cities.len(),
            "Campaign admitted"
        );

        if let Some(scraper) = &self.scraper {
            if let Err(e) = scraper.forward(&campaign).await {
                tracing::error!(
                    campaign_id = %campaign.id,
                    error = %e,
                    "Forwarding to scraper failed, marking campaign failed"
                );
                self.ledger
                    .update_campaign_status(campaign.id, CampaignStatus::Failed)
                    .await?;
                return Err(e.into());
            }
        }

        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::models::Platform;

    fn request(user_id: &str) -> CampaignRequest {
        CampaignRequest {
            user_id: user_id.to_string(),
            platform: Some(Platform::Linkedin),
            title: "Backend engineer".to_string(),
            keywords: "rust".to_string(),
            location: Some("Berlin".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_second_request_conflicts_with_first() {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = AdmissionService::new(ledger.clone(), None);

        let first = service.request_campaign(&request("u1")).await.unwrap();
        assert_eq!(first.status, CampaignStatus::Pending);
        assert_eq!(first.job_limit, DEFAULT_JOB_LIMIT);

        match service.request_campaign(&request("u1")).await {
            Err(AdmissionError::Conflict(existing)) => assert_eq!(existing.id, first.id),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(ledger.campaign_count(), 1);
    }

    #[tokio::test]
    async fn test_finished_campaign_does_not_block() {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = AdmissionService::new(ledger.clone(), None);

        let first = service.request_campaign(&request("u1")).await.unwrap();
        ledger
            .update_campaign_status(first.id, CampaignStatus::Completed)
            .await
            .unwrap();

        assert!(service.request_campaign(&request("u1")).await.is_ok());
        assert_eq!(ledger.campaign_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_request_touches_nothing() {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = AdmissionService::new(ledger.clone(), None);

        let mut invalid = request("u1");
        invalid.job_limit = Some(500);
        assert!(matches!(
            service.request_campaign(&invalid).await,
            Err(AdmissionError::Validation(ValidationError::JobLimitOutOfRange(500)))
        ));
        assert_eq!(ledger.campaign_count(), 0);
    }
}
