//! Continuation tokens
//!
//! The hosted checkout carries an opaque string through the payer's browser
//! and hands it back on the callback. We use it to recover which user and
//! payment the callback belongs to without any server-side session.
//!
//! Wire format: `base64url(json)` or, when a signing secret is configured,
//! `base64url(json).hex(hmac_sha256(secret, base64url(json)))`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use super::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Correlation identifiers carried across the checkout redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub user_id: String,
    pub payment_id: Uuid,
    pub plan: String,
}

/// Encodes and decodes continuation tokens
#[derive(Clone)]
pub struct ContinuationCodec {
    secret: Option<Vec<u8>>,
}

impl ContinuationCodec {
    /// Codec that signs tokens and rejects unsigned or tampered ones
    pub fn signed(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Some(secret.as_ref().to_vec()),
        }
    }

    /// Codec for the legacy unsigned format
    pub fn unsigned() -> Self {
        Self { secret: None }
    }

    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if !secret.is_empty() => Self::signed(secret),
            _ => Self::unsigned(),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    pub fn encode(&self, token: &ContinuationToken) -> Result<String, GatewayError> {
        let json = serde_json::to_vec(token).map_err(|e| GatewayError::ParseError(e.to_string()))?;
        let body = URL_SAFE_NO_PAD.encode(json);

        match &self.secret {
            Some(secret) => Ok(format!("{}.{}", body, sign(secret, &body)?)),
            None => Ok(body),
        }
    }

    pub fn decode(&self, raw: &str) -> Result<ContinuationToken, GatewayError> {
        let raw = raw.trim();
        let (body, signature) = match raw.split_once('.') {
            Some((body, signature)) => (body, Some(signature)),
            None => (raw, None),
        };

        match (&self.secret, signature) {
            (Some(secret), Some(signature)) => verify(secret, body, signature)?,
            (Some(_), None) => return Err(GatewayError::ContinuationVerificationFailed),
            (None, _) => {
                tracing::warn!("Accepting unsigned continuation token; no signing secret configured");
            }
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| GatewayError::InvalidCallback(format!("continuation is not base64: {e}")))?;

        serde_json::from_slice(&json)
            .map_err(|e| GatewayError::InvalidCallback(format!("continuation is malformed: {e}")))
    }
}

fn sign(secret: &[u8], body: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| GatewayError::ConfigError("invalid continuation signing secret".to_string()))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify(secret: &[u8], body: &str, signature: &str) -> Result<(), GatewayError> {
    let received =
        hex::decode(signature).map_err(|_| GatewayError::ContinuationVerificationFailed)?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| GatewayError::ContinuationVerificationFailed)?;
    mac.update(body.as_bytes());

    // verify_slice compares in constant time
    mac.verify_slice(&received)
        .map_err(|_| GatewayError::ContinuationVerificationFailed)
}
