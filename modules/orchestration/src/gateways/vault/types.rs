use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

// ----------------------------------------------------------------------------
// Setup tokens
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CreateSetupTokenRequest {
    pub payment_source: SetupTokenSource,
}

#[derive(Debug, Serialize)]
pub struct SetupTokenSource {
    pub paypal: PaypalSetupSource,
}

#[derive(Debug, Serialize)]
pub struct PaypalSetupSource {
    pub usage_type: &'static str,
    pub experience_context: ExperienceContext,
}

#[derive(Debug, Serialize)]
pub struct ExperienceContext {
    pub return_url: String,
    pub cancel_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetupToken {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl SetupToken {
    /// Where the payer approves the vaulting
    pub fn approve_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel.eq_ignore_ascii_case("approve"))
            .map(|link| link.href.as_str())
    }
}

// ----------------------------------------------------------------------------
// Payment tokens
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CreatePaymentTokenRequest {
    pub payment_source: PaymentTokenSource,
}

#[derive(Debug, Serialize)]
pub struct PaymentTokenSource {
    pub token: TokenReference,
}

#[derive(Debug, Serialize)]
pub struct TokenReference {
    pub id: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PaymentToken {
    pub id: String,
    #[serde(default)]
    pub customer: Option<VaultCustomer>,
}

#[derive(Debug, Deserialize)]
pub struct VaultCustomer {
    pub id: String,
}

// ----------------------------------------------------------------------------
// Orders
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub intent: &'static str,
    pub purchase_units: Vec<PurchaseUnitRequest>,
    pub payment_source: OrderPaymentSource,
}

#[derive(Debug, Serialize)]
pub struct PurchaseUnitRequest {
    pub reference_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct OrderPaymentSource {
    pub paypal: VaultedPaypal,
}

#[derive(Debug, Serialize)]
pub struct VaultedPaypal {
    pub vault_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseUnit {
    #[serde(default)]
    pub payments: Option<PurchaseUnitPayments>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseUnitPayments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl Order {
    /// `purchase_units[0].payments.captures[0]`
    pub fn first_capture(&self) -> Option<&Capture> {
        self.purchase_units
            .first()
            .and_then(|unit| unit.payments.as_ref())
            .and_then(|payments| payments.captures.first())
    }

    pub fn is_completed(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("COMPLETED"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capture_id_from_nested_response() {
        let order: Order = serde_json::from_value(json!({
            "id": "ORDER-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "reference_id": "PPV-1-user",
                "payments": {"captures": [{"id": "CAP-1", "status": "COMPLETED"}]}
            }]
        }))
        .unwrap();
        assert_eq!(order.first_capture().map(|c| c.id.as_str()), Some("CAP-1"));
        assert!(order.is_completed());
    }

    #[test]
    fn test_created_order_has_no_capture() {
        let order: Order = serde_json::from_value(json!({
            "id": "ORDER-1",
            "status": "CREATED",
            "purchase_units": [{"reference_id": "PPV-1-user"}]
        }))
        .unwrap();
        assert!(order.first_capture().is_none());
        assert!(!order.is_completed());
    }

    #[test]
    fn test_approve_link_lookup() {
        let token: SetupToken = serde_json::from_value(json!({
            "id": "SETUP-1",
            "status": "PAYER_ACTION_REQUIRED",
            "links": [
                {"href": "https://example.test/self", "rel": "self"},
                {"href": "https://example.test/approve", "rel": "approve", "method": "GET"}
            ]
        }))
        .unwrap();
        assert_eq!(token.approve_url(), Some("https://example.test/approve"));
    }
}
