//! Request validation
//!
//! Every check here runs before any provider, storage or Ledger call, so a
//! rejected request has no side effects.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{CampaignRequest, DispatchRequest, InitiatePaymentRequest, Platform};

pub const MIN_JOB_LIMIT: i32 = 1;
pub const MAX_JOB_LIMIT: i32 = 200;
pub const DEFAULT_JOB_LIMIT: i32 = 25;
pub const MAX_EXPERIENCE_YEARS: i32 = 40;
/// Amounts are stored as NUMERIC(12, 2)
pub const AMOUNT_SCALE: u32 = 2;
pub const MIN_FRESHNESS_DAYS: i32 = 1;
pub const MAX_FRESHNESS_DAYS: i32 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Amount must have at most 2 decimal places, got {0}")]
    AmountPrecision(Decimal),

    #[error("Amount must not exceed 9999999999.99, got {0}")]
    AmountTooLarge(Decimal),

    #[error("Currency must be a 3-letter code (ISO 4217), got: {0}")]
    InvalidCurrency(String),

    #[error("Job limit must be between 1 and 200, got {0}")]
    JobLimitOutOfRange(i32),

    #[error("Experience must be between 0 and 40 years, got {0}")]
    ExperienceOutOfRange(i32),

    #[error("Freshness must be between 1 and 30 days, got {0}")]
    FreshnessOutOfRange(i32),

    #[error("Platform {0:?} requires a location")]
    MissingLocation(Platform),

    #[error("Platform {0:?} requires at least one city")]
    MissingCities(Platform),

    #[error("At least one job id is required")]
    NoJobIds,

    #[error("Job id at position {0} is empty")]
    EmptyJobId(usize),

    #[error("Amount {given} does not match the payment amount {expected}")]
    AmountMismatch { expected: Decimal, given: Decimal },

    #[error("Currency {given} does not match the payment currency {expected}")]
    CurrencyMismatch { expected: String, given: String },
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Largest amount the payments table can hold
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, AMOUNT_SCALE)
}

fn is_valid_currency(currency: &str) -> bool {
    currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic())
}

/// Validate a payment initiation request
pub fn validate_initiate_payment(request: &InitiatePaymentRequest) -> Result<(), ValidationError> {
    require(&request.user_id, "user_id")?;
    require(&request.plan, "plan")?;

    if request.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(request.amount));
    }
    if request.amount.normalize().scale() > AMOUNT_SCALE {
        return Err(ValidationError::AmountPrecision(request.amount));
    }
    if request.amount > max_amount() {
        return Err(ValidationError::AmountTooLarge(request.amount));
    }

    if let Some(currency) = &request.currency {
        if !is_valid_currency(currency) {
            return Err(ValidationError::InvalidCurrency(currency.clone()));
        }
    }

    Ok(())
}

/// Validate a campaign request and return its platform
///
/// # Validation Rules
///
/// - `user_id`, `title`, `keywords`: non-empty
/// - `platform`: present
/// - `job_limit`: 1-200 when given
/// - `experience_years`: 0-40 when given
/// - `freshness_days`: 1-30 when given
/// - coded-city platforms need a non-empty `cities` list, all others a
///   non-empty `location`
pub fn validate_campaign_request(request: &CampaignRequest) -> Result<Platform, ValidationError> {
    require(&request.user_id, "user_id")?;
    require(&request.title, "title")?;
    require(&request.keywords, "keywords")?;

    let platform = request
        .platform
        .ok_or(ValidationError::MissingField("platform"))?;

    if let Some(limit) = request.job_limit {
        if !(MIN_JOB_LIMIT..=MAX_JOB_LIMIT).contains(&limit) {
            return Err(ValidationError::JobLimitOutOfRange(limit));
        }
    }

    if let Some(years) = request.experience_years {
        if !(0..=MAX_EXPERIENCE_YEARS).contains(&years) {
            return Err(ValidationError::ExperienceOutOfRange(years));
        }
    }

    if let Some(days) = request.freshness_days {
        if !(MIN_FRESHNESS_DAYS..=MAX_FRESHNESS_DAYS).contains(&days) {
            return Err(ValidationError::FreshnessOutOfRange(days));
        }
    }

    if platform.uses_coded_cities() {
        if request.cities.iter().all(|city| city.trim().is_empty()) {
            return Err(ValidationError::MissingCities(platform));
        }
    } else if request
        .location
        .as_deref()
        .map_or(true, |location| location.trim().is_empty())
    {
        return Err(ValidationError::MissingLocation(platform));
    }

    Ok(platform)
}

/// Validate a bulk send request
pub fn validate_dispatch_request(request: &DispatchRequest) -> Result<(), ValidationError> {
    if request.job_ids.is_empty() {
        return Err(ValidationError::NoJobIds);
    }
    if let Some(position) = request.job_ids.iter().position(|id| id.trim().is_empty()) {
        return Err(ValidationError::EmptyJobId(position));
    }

    require(&request.user_id, "user_id")?;
    require(&request.user_email, "user_email")?;
    require(&request.credentials.gmail_account_id, "gmail_account_id")?;
    require(&request.credentials.access_token, "access_token")?;
    require(&request.credentials.refresh_token, "refresh_token")?;

    Ok(())
}
