//! Record types shared by the store, the state machine and the pipeline.
//!
//! Every record references its owning user by id only; user lifecycle is
//! managed elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FailureReason;

/// Deserialize an explicit `null` the same as a missing field.
///
/// Pair with `#[serde(default)]` for fields that may be absent or null.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Forwarding Rules
// =============================================================================

/// A user-configured mapping from an inbound alias to a destination address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub id: String,
    /// Owning user id
    pub owner: String,
    /// Inbound alias the provider receives mail for
    pub rule_email: String,
    /// Destination the message is forwarded to
    pub forward_to_email: String,
    /// Verified sender address used for the outbound message
    pub send_from_email: String,
}

// =============================================================================
// Forwarding Events
// =============================================================================

/// Lifecycle status of one forwarding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Sent => "sent",
            EventStatus::Delivered => "delivered",
            EventStatus::Failed => "failed",
        }
    }

    /// `delivered` and `failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Delivered | EventStatus::Failed)
    }

    /// Whether moving from `self` to `next` is an edge of the lifecycle graph.
    ///
    /// Self-loops are not edges; callers treat them as no-ops.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Pending, EventStatus::Sent)
                | (EventStatus::Pending, EventStatus::Failed)
                | (EventStatus::Sent, EventStatus::Delivered)
                | (EventStatus::Sent, EventStatus::Failed)
        )
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error attached to a failed forwarding event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub reason: FailureReason,
    /// Free-form detail, e.g. the provider's error text or bounce reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorPayload {
    pub fn new(reason: FailureReason) -> Self {
        Self { reason, error: None }
    }

    pub fn with_detail(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            error: Some(detail.into()),
        }
    }
}

/// Persisted record of one inbound message's forwarding attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardingEvent {
    pub id: String,
    pub owner: String,
    pub rule: String,
    /// Provider id of the inbound message; fixed at creation
    pub received_email_id: String,
    /// Provider id of the outbound message; set once, on the `sent` transition
    pub sent_email_id: Option<String>,
    pub status: EventStatus,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub error: Option<ErrorPayload>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Fields supplied when a forwarding event is created.
#[derive(Debug, Clone)]
pub struct NewForwardingEvent {
    pub owner: String,
    pub rule: String,
    pub received_email_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
}

// =============================================================================
// Audit Log
// =============================================================================

/// Closed vocabulary of audit entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "webhook.received")]
    WebhookReceived,
    #[serde(rename = "forward.initiated")]
    ForwardInitiated,
    #[serde(rename = "email.sent")]
    EmailSent,
    #[serde(rename = "email.delivered")]
    EmailDelivered,
    #[serde(rename = "email.failed")]
    EmailFailed,
    #[serde(rename = "error")]
    Error,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::WebhookReceived => "webhook.received",
            AuditEventType::ForwardInitiated => "forward.initiated",
            AuditEventType::EmailSent => "email.sent",
            AuditEventType::EmailDelivered => "email.delivered",
            AuditEventType::EmailFailed => "email.failed",
            AuditEventType::Error => "error",
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: String,
    pub owner: String,
    pub rule: String,
    /// Forwarding event this entry refers to, if any
    pub event: Option<String>,
    #[serde(rename = "type")]
    pub kind: AuditEventType,
    pub metadata: serde_json::Value,
    pub created: DateTime<Utc>,
}

/// Fields supplied when an audit entry is appended.
#[derive(Debug, Clone)]
pub struct NewEventLog {
    pub owner: String,
    pub rule: String,
    pub event: Option<String>,
    pub kind: AuditEventType,
    pub metadata: serde_json::Value,
}

// =============================================================================
// Secrets
// =============================================================================

/// The two per-user secret kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Resend API key used to fetch and send mail
    ApiKey,
    /// Svix signing secret for inbound webhooks
    WebhookSecret,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::ApiKey => "api_key",
            SecretKind::WebhookSecret => "webhook_secret",
        }
    }
}

/// A secret at rest. `ciphertext` is always Secret Vault output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub id: String,
    pub owner: String,
    pub kind: SecretKind,
    pub ciphertext: String,
}
