use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// PAYMENTS
// ============================================================================

/// Payment provider identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Hosted-SDK token flow
    GatewayA,
    /// Vault / order-capture flow
    GatewayB,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GatewayA => "gateway_a",
            Provider::GatewayB => "gateway_b",
        }
    }

    /// Prefix of the order references generated for this provider
    pub fn order_prefix(&self) -> &'static str {
        match self {
            Provider::GatewayA => "FGC",
            Provider::GatewayB => "PPV",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle status
///
/// `pending` is the only non-terminal state. `abandoned` is reached only
/// through the lazy timeout applied during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Abandoned,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment record from the payments table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub plan: String,
    pub amount: Decimal,
    pub currency: String,
    pub provider: Provider,
    pub status: PaymentStatus,
    pub order_ref: String,
    pub transaction_ref: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Build a fresh `pending` record
    pub fn new_pending(
        id: Uuid,
        user_id: &str,
        plan: &str,
        amount: Decimal,
        currency: &str,
        provider: Provider,
        order_ref: String,
        metadata: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.to_string(),
            plan: plan.to_string(),
            amount,
            currency: currency.to_string(),
            provider,
            status: PaymentStatus::Pending,
            order_ref,
            transaction_ref: None,
            metadata,
            created_at: now,
            paid_at: None,
            updated_at: now,
        }
    }

    /// Read a string value from the provider metadata
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(JsonValue::as_str)
    }
}

/// A terminal state change to apply to a pending payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub status: PaymentStatus,
    pub transaction_ref: Option<String>,
    /// Merged into the existing metadata object
    pub metadata: JsonValue,
}

impl PaymentTransition {
    pub fn to(status: PaymentStatus) -> Self {
        Self {
            status,
            transaction_ref: None,
            metadata: JsonValue::Object(Default::default()),
        }
    }

    pub fn with_transaction_ref(mut self, transaction_ref: Option<String>) -> Self {
        self.transaction_ref = transaction_ref;
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Billing fields forwarded to the hosted checkout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

/// Request body for initiating a payment
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub provider: Provider,
    pub user_id: String,
    pub amount: Decimal,
    pub plan: String,
    pub currency: Option<String>,
    #[serde(default)]
    pub billing: BillingDetails,
}

/// Response for a successful initiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub payment_id: Uuid,
    pub order_ref: String,
    pub provider_init_payload: JsonValue,
}

/// Response for callback application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
}

/// Request body for exchanging an approved setup token (gateway B)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentTokenRequest {
    pub payment_id: Uuid,
    #[serde(alias = "approval_token_id")]
    pub setup_token_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTokenResponse {
    pub payment_id: Uuid,
    pub payment_token_id: String,
}

/// Request body for a client-forced order capture (gateway B)
///
/// `payment_token_id` defaults to the token stored on the payment; amount
/// and currency, when given, must match the payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureOrderRequest {
    pub payment_id: Uuid,
    pub payment_token_id: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

/// Response for payment verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub plan: String,
    pub provider: Provider,
    pub order_ref: String,
    pub transaction_ref: Option<String>,
}

impl From<&PaymentRecord> for VerifyPaymentResponse {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            payment_id: record.id,
            status: record.status,
            amount: record.amount,
            currency: record.currency.clone(),
            plan: record.plan.clone(),
            provider: record.provider,
            order_ref: record.order_ref.clone(),
            transaction_ref: record.transaction_ref.clone(),
        }
    }
}

/// Onboarding progress unlocked by a completed payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OnboardingPayment {
    pub user_id: String,
    pub plan: String,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_ref: Option<String>,
    pub payment_method: JsonValue,
    pub payment_completed: bool,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// CAMPAIGNS
// ============================================================================

/// Campaign lifecycle status, advanced by the external scraper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Pending and processing campaigns count against the one-per-user limit
    pub fn is_active(&self) -> bool {
        matches!(self, CampaignStatus::Pending | CampaignStatus::Processing)
    }
}

/// Job board a campaign searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_platform", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linkedin,
    Indeed,
    Glassdoor,
    /// Addresses locations by coded city identifiers instead of free text
    Naukri,
}

impl Platform {
    pub fn uses_coded_cities(&self) -> bool {
        matches!(self, Platform::Naukri)
    }
}

/// A city requested for a coded-location platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityTarget {
    pub name: String,
    /// Platform identifier; `None` when the name could not be mapped
    pub code: Option<String>,
}

/// Campaign record from the campaigns table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignRecord {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub keywords: String,
    pub platform: Platform,
    pub job_limit: i32,
    pub status: CampaignStatus,
    pub cv_ref: Option<String>,
    pub cover_letter_ref: Option<String>,
    pub location: Option<String>,
    #[sqlx(json)]
    pub cities: Vec<CityTarget>,
    pub experience_years: Option<i32>,
    pub freshness_days: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for a new campaign
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignRequest {
    pub user_id: String,
    pub platform: Option<Platform>,
    pub title: String,
    pub keywords: String,
    pub job_limit: Option<i32>,
    pub cv_ref: Option<String>,
    pub cover_letter_ref: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub cities: Vec<String>,
    pub experience_years: Option<i32>,
    pub freshness_days: Option<i32>,
}

// ============================================================================
// BULK DISPATCH
// ============================================================================

/// Mail account credentials handed to the dispatch sink
#[derive(Debug, Clone, Deserialize)]
pub struct MailCredentials {
    pub gmail_account_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Request body for a bulk application send
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub job_ids: Vec<String>,
    pub user_id: String,
    pub user_email: String,
    pub credentials: MailCredentials,
    pub cv_ref: Option<String>,
    pub cover_letter_ref: Option<String>,
}

/// Outcome of a bulk send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub accepted: bool,
    pub job_count: usize,
    pub sink_status: u16,
    pub sink_response: JsonValue,
}

/// Standard error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
