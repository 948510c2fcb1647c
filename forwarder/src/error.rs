//! Error taxonomy for the forwarding pipeline.
//!
//! Layer-specific errors (`VaultError`, `StoreError`, `SignatureError`,
//! `ProviderError`, `LifecycleError`) live next to their components. The
//! pipeline folds them into [`ForwardError`], which decides the HTTP status
//! and, once a forwarding event exists, the machine-readable failure reason.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleError;
use crate::model::ErrorPayload;
use crate::store::StoreError;

/// Stable reason codes recorded on failed forwarding events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    WebhookSecretNotFound,
    WebhookSecretDecryptionFailed,
    WebhookVerifierCreationFailed,
    InvalidWebhookSignature,
    ApiKeyNotFound,
    ApiKeyDecryptionFailed,
    EmailContentFetchFailed,
    EmailSendFailed,
    /// Reported by the provider after the message was accepted (bounce etc.)
    DeliveryFailed,
    /// Record store unavailable mid-pipeline
    PersistenceFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::WebhookSecretNotFound => "webhook_secret_not_found",
            FailureReason::WebhookSecretDecryptionFailed => "webhook_secret_decryption_failed",
            FailureReason::WebhookVerifierCreationFailed => "webhook_verifier_creation_failed",
            FailureReason::InvalidWebhookSignature => "invalid_webhook_signature",
            FailureReason::ApiKeyNotFound => "api_key_not_found",
            FailureReason::ApiKeyDecryptionFailed => "api_key_decryption_failed",
            FailureReason::EmailContentFetchFailed => "email_content_fetch_failed",
            FailureReason::EmailSendFailed => "email_send_failed",
            FailureReason::DeliveryFailed => "delivery_failed",
            FailureReason::PersistenceFailed => "persistence_failed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-level error. Each variant maps to exactly one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Malformed or unparseable payload (400)
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Rule, secret, key, content or event absent (404)
    #[error("{message}")]
    NotFound {
        reason: Option<FailureReason>,
        message: String,
    },

    /// Signature verification failed (401)
    #[error("{message}")]
    Security {
        reason: FailureReason,
        message: String,
    },

    /// An upstream provider call failed (500)
    #[error("{message}: {detail}")]
    ExternalService {
        reason: FailureReason,
        message: String,
        detail: String,
    },

    /// Decryption or verifier construction failed (500)
    #[error("{message}")]
    Internal {
        reason: FailureReason,
        message: String,
    },

    /// Record store read or write failed (500)
    #[error("record store failure: {0}")]
    Persistence(#[from] StoreError),

    /// A forwarding event update was refused (500)
    #[error("forwarding event update refused: {0}")]
    Lifecycle(LifecycleError),
}

impl From<LifecycleError> for ForwardError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Store(e) => ForwardError::Persistence(e),
            other => ForwardError::Lifecycle(other),
        }
    }
}

impl ForwardError {
    pub fn not_found(reason: FailureReason, message: impl Into<String>) -> Self {
        ForwardError::NotFound {
            reason: Some(reason),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::Validation(_) => StatusCode::BAD_REQUEST,
            ForwardError::NotFound { .. } => StatusCode::NOT_FOUND,
            ForwardError::Security { .. } => StatusCode::UNAUTHORIZED,
            ForwardError::ExternalService { .. }
            | ForwardError::Internal { .. }
            | ForwardError::Persistence(_)
            | ForwardError::Lifecycle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reason code to record on the forwarding event, if this failure has one.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            ForwardError::NotFound { reason, .. } => *reason,
            ForwardError::Security { reason, .. }
            | ForwardError::ExternalService { reason, .. }
            | ForwardError::Internal { reason, .. } => Some(*reason),
            ForwardError::Persistence(_) => Some(FailureReason::PersistenceFailed),
            ForwardError::Validation(_) | ForwardError::Lifecycle(_) => None,
        }
    }

    /// Short human-readable summary, without upstream detail.
    pub fn message(&self) -> String {
        match self {
            ForwardError::NotFound { message, .. }
            | ForwardError::Security { message, .. }
            | ForwardError::ExternalService { message, .. }
            | ForwardError::Internal { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Upstream or backend error text worth keeping on the event.
    pub fn detail(&self) -> Option<String> {
        match self {
            ForwardError::ExternalService { detail, .. } => Some(detail.clone()),
            ForwardError::Persistence(e) => Some(e.to_string()),
            _ => None,
        }
    }

    /// Structured payload stored on the forwarding event.
    pub fn error_payload(&self) -> Option<ErrorPayload> {
        self.reason().map(|reason| ErrorPayload {
            reason,
            error: self.detail(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ForwardError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ForwardError::not_found(FailureReason::ApiKeyNotFound, "missing").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ForwardError::Security {
                reason: FailureReason::InvalidWebhookSignature,
                message: "invalid webhook signature".into(),
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ForwardError::Internal {
                reason: FailureReason::ApiKeyDecryptionFailed,
                message: "unable to decrypt".into(),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_payload_carries_detail() {
        let err = ForwardError::ExternalService {
            reason: FailureReason::EmailSendFailed,
            message: "failed to send email".into(),
            detail: "domain not verified".into(),
        };

        let payload = err.error_payload().unwrap();
        assert_eq!(payload.reason, FailureReason::EmailSendFailed);
        assert_eq!(payload.error.as_deref(), Some("domain not verified"));
        assert_eq!(err.message(), "failed to send email");
    }

    #[test]
    fn test_rule_not_found_has_no_reason() {
        let err = ForwardError::NotFound {
            reason: None,
            message: "forwarding rule not found".into(),
        };
        assert!(err.reason().is_none());
        assert!(err.error_payload().is_none());
    }

    #[test]
    fn test_persistence_failure_has_reason() {
        let err = ForwardError::from(StoreError::Backend("connection refused".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let payload = err.error_payload().unwrap();
        assert_eq!(payload.reason, FailureReason::PersistenceFailed);
        assert!(payload.error.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_lifecycle_store_error_becomes_persistence() {
        let err = ForwardError::from(LifecycleError::Store(StoreError::Backend("down".into())));
        assert!(matches!(err, ForwardError::Persistence(_)));

        let err = ForwardError::from(LifecycleError::SentIdOutsideSent);
        assert!(matches!(err, ForwardError::Lifecycle(_)));
        assert!(err.reason().is_none());
    }

    #[test]
    fn test_reason_codes_match_serde() {
        let json = serde_json::to_value(FailureReason::WebhookSecretDecryptionFailed).unwrap();
        assert_eq!(json, "webhook_secret_decryption_failed");
        assert_eq!(
            FailureReason::EmailContentFetchFailed.to_string(),
            "email_content_fetch_failed"
        );
    }
}
