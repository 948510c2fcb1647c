//! Resend (Svix) webhook signature verification.
//!
//! Resend signs webhook deliveries with Svix: HMAC-SHA256 over
//! `{id}.{timestamp}.{body}` keyed by the base64 part of a `whsec_` secret.
//! Reference: https://docs.svix.com/receiving/verifying-payloads/how-manual

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Header names, branded first then the unbranded fallback.
const ID_HEADERS: [&str; 2] = ["svix-id", "webhook-id"];
const TIMESTAMP_HEADERS: [&str; 2] = ["svix-timestamp", "webhook-timestamp"];
const SIGNATURE_HEADERS: [&str; 2] = ["svix-signature", "webhook-signature"];

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),

    #[error("missing required header {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature timestamp")]
    InvalidTimestamp,

    #[error("signature timestamp too old")]
    TimestampTooOld,

    #[error("signature timestamp too new")]
    TimestampTooNew,

    #[error("no matching signature found")]
    NoMatchingSignature,
}

/// Verifier for one user's signing secret.
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_seconds: u64,
}

impl WebhookVerifier {
    /// Build a verifier from a `whsec_`-prefixed (or bare) base64 secret.
    pub fn new(secret: &str, tolerance_seconds: u64) -> Result<Self, SignatureError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);

        if encoded.is_empty() {
            return Err(SignatureError::InvalidSecret("empty secret".to_string()));
        }

        let key = STANDARD
            .decode(encoded)
            .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;

        Ok(Self {
            key,
            tolerance_seconds,
        })
    }

    /// Verify a delivery against the current time.
    pub fn verify(&self, body: &[u8], headers: &HeaderMap) -> Result<(), SignatureError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        self.verify_at(body, headers, now)
    }

    /// Verify a delivery as if the current time were `now` (unix seconds).
    pub fn verify_at(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        now: u64,
    ) -> Result<(), SignatureError> {
        let msg_id = header_value(headers, &ID_HEADERS)?;
        let timestamp = header_value(headers, &TIMESTAMP_HEADERS)?;
        let signatures = header_value(headers, &SIGNATURE_HEADERS)?;

        // Verify timestamp is within tolerance (prevents replay attacks)
        let webhook_time: u64 = match timestamp.trim().parse() {
            Ok(t) => t,
            Err(_) => {
                warn!(timestamp = %timestamp, "webhook_signature_invalid_timestamp");
                return Err(SignatureError::InvalidTimestamp);
            }
        };

        if now > webhook_time && now - webhook_time > self.tolerance_seconds {
            warn!(
                webhook_time = webhook_time,
                current_time = now,
                tolerance_seconds = self.tolerance_seconds,
                "webhook_signature_stale"
            );
            return Err(SignatureError::TimestampTooOld);
        }

        if webhook_time > now && webhook_time - now > self.tolerance_seconds {
            warn!(
                webhook_time = webhook_time,
                current_time = now,
                tolerance_seconds = self.tolerance_seconds,
                "webhook_signature_from_future"
            );
            return Err(SignatureError::TimestampTooNew);
        }

        let expected = self.compute(msg_id, webhook_time, body);

        // Header holds space-separated "v1,<base64>" entries; any match passes.
        let valid = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .any(|(_, sig)| constant_time_compare(&expected, sig));

        if !valid {
            warn!(
                msg_id = %msg_id,
                signature_count = signatures.split_whitespace().count(),
                "webhook_signature_mismatch"
            );
            return Err(SignatureError::NoMatchingSignature);
        }

        Ok(())
    }

    /// Produce a `v1,<base64>` signature entry for a delivery.
    pub fn sign(&self, msg_id: &str, timestamp: u64, body: &[u8]) -> String {
        format!("{SIGNATURE_VERSION},{}", self.compute(msg_id, timestamp, body))
    }

    fn compute(&self, msg_id: &str, timestamp: u64, body: &[u8]) -> String {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(m) => m,
            Err(_) => unreachable!("HMAC key can be of any size"),
        };

        mac.update(format!("{msg_id}.{timestamp}.").as_bytes());
        mac.update(body);

        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// First present header among `names`.
fn header_value<'a>(
    headers: &'a HeaderMap,
    names: &[&'static str; 2],
) -> Result<&'a str, SignatureError> {
    names
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
        })
        .ok_or(SignatureError::MissingHeader(names[0]))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
