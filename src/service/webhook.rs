// service/webhook.rs
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Third-party services allowed to push webhooks at us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookProvider {
    Kotani,
    Paycrest,
    SmileId,
    Sumsub,
    Idrx,
}

impl WebhookProvider {
    pub const ALL: [WebhookProvider; 5] = [
        WebhookProvider::Kotani,
        WebhookProvider::Paycrest,
        WebhookProvider::SmileId,
        WebhookProvider::Sumsub,
        WebhookProvider::Idrx,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            WebhookProvider::Kotani => "kotani",
            WebhookProvider::Paycrest => "paycrest",
            WebhookProvider::SmileId => "smile_id",
            WebhookProvider::Sumsub => "sumsub",
            WebhookProvider::Idrx => "idrx",
        }
    }

    /// Environment variable holding the shared secret, e.g. `PAYCREST_WEBHOOK_SECRET`.
    pub fn secret_env_key(&self) -> String {
        format!("{}_WEBHOOK_SECRET", self.slug().to_uppercase())
    }

    pub fn signature_header(&self) -> &'static str {
        match self {
            WebhookProvider::Kotani => "x-kotani-signature",
            WebhookProvider::Paycrest => "x-paycrest-signature",
            WebhookProvider::SmileId => "x-smile-signature",
            WebhookProvider::Sumsub => "x-payload-digest",
            WebhookProvider::Idrx => "x-idrx-signature",
        }
    }

    pub fn is_identity_provider(&self) -> bool {
        matches!(self, WebhookProvider::SmileId | WebhookProvider::Sumsub)
    }
}

impl fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for WebhookProvider {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        WebhookProvider::ALL
            .into_iter()
            .find(|p| p.slug() == normalized)
            .ok_or_else(|| ServiceError::Validation(format!("unknown webhook provider '{}'", s)))
    }
}

/// Hex-encoded HMAC-SHA256 of `payload` keyed by `secret`.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `provided_signature` against the HMAC-SHA256 of the raw, unparsed body.
///
/// Fails closed: an empty secret, an empty or non-hex signature, or a digest of
/// the wrong length all return `false`.
pub fn verify(raw_body: &[u8], provided_signature: &str, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }

    let provided = match hex::decode(provided_signature.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    // ct_eq on slices of different length is false without leaking where they differ
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

/// Holds one shared secret per enabled provider.
#[derive(Clone, Default)]
pub struct WebhookVerifier {
    secrets: HashMap<WebhookProvider, Vec<u8>>,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut enabled: Vec<&str> = self.secrets.keys().map(|p| p.slug()).collect();
        enabled.sort_unstable();
        f.debug_struct("WebhookVerifier")
            .field("enabled", &enabled)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secrets: HashMap<WebhookProvider, Vec<u8>>) -> Result<Self, ServiceError> {
        if let Some((provider, _)) = secrets.iter().find(|(_, secret)| secret.is_empty()) {
            return Err(ServiceError::MissingSecret(provider.secret_env_key()));
        }
        Ok(Self { secrets })
    }

    pub fn is_enabled(&self, provider: WebhookProvider) -> bool {
        self.secrets.contains_key(&provider)
    }

    /// Verifies the provider's signature header against the raw request body.
    /// A missing header is treated exactly like a wrong one.
    pub fn verify_request(
        &self,
        provider: WebhookProvider,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<(), ServiceError> {
        let secret = self
            .secrets
            .get(&provider)
            .ok_or_else(|| ServiceError::MissingSecret(provider.secret_env_key()))?;

        let signature = headers
            .get(provider.signature_header())
            .and_then(|h| h.to_str().ok())
            .ok_or(ServiceError::InvalidSignature)?;

        if verify(raw_body, signature, secret) {
            Ok(())
        } else {
            Err(ServiceError::InvalidSignature)
        }
    }
}
