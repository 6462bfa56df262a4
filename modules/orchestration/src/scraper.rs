//! Forwarding of admitted campaigns to the external scraper

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::models::CampaignRecord;

const SCRAPER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Scraper rejected campaign (status {status_code}): {body}")]
    Rejected { status_code: u16, body: String },
}

#[derive(Clone)]
pub struct ScraperClient {
    url: String,
    http_client: Client,
}

impl ScraperClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ScraperError> {
        let http_client = Client::builder()
            .timeout(SCRAPER_TIMEOUT)
            .build()
            .map_err(|e| ScraperError::HttpError(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    /// POST the campaign as JSON to the scraper endpoint
    pub async fn forward(&self, campaign: &CampaignRecord) -> Result<(), ScraperError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(campaign)
            .send()
            .await
            .map_err(|e| ScraperError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ScraperError::Rejected {
                status_code: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            campaign_id = %campaign.id,
            user_id = %campaign.user_id,
            "Campaign forwarded to scraper"
        );
        Ok(())
    }
}
