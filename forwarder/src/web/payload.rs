//! Resend webhook payloads.
//!
//! Reference: https://resend.com/docs/dashboard/webhooks/event-types

use serde::Deserialize;

use crate::model::null_as_default;

/// Webhook types the forwarder acts on.
pub const SUPPORTED_TYPES: [&str; 4] = [
    "email.received",
    "email.sent",
    "email.delivered",
    "email.failed",
];

/// Only the discriminator, parsed before anything else.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A supported webhook delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookEvent {
    #[serde(rename = "email.received")]
    Received { data: ReceivedData },

    #[serde(rename = "email.sent")]
    Sent { data: OutboundData },

    #[serde(rename = "email.delivered")]
    Delivered { data: OutboundData },

    #[serde(rename = "email.failed")]
    Failed { data: FailedData },
}

/// Inbound message notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceivedData {
    pub email_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cc: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bcc: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<ReceivedAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceivedAttachment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: String,
}

/// Outbound message lifecycle notification (`email.sent`, `email.delivered`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutboundData {
    pub email_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailedData {
    pub email_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: FailureDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailureDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
}

impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::Received { .. } => "email.received",
            WebhookEvent::Sent { .. } => "email.sent",
            WebhookEvent::Delivered { .. } => "email.delivered",
            WebhookEvent::Failed { .. } => "email.failed",
        }
    }

    /// Provider id of the message this notification is about.
    pub fn email_id(&self) -> &str {
        match self {
            WebhookEvent::Received { data } => &data.email_id,
            WebhookEvent::Sent { data } | WebhookEvent::Delivered { data } => &data.email_id,
            WebhookEvent::Failed { data } => &data.email_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_deserialization() {
        let json = r#"{
            "type": "email.received",
            "created_at": "2025-01-01T00:00:00.000Z",
            "data": {
                "email_id": "in_1",
                "created_at": "2025-01-01T00:00:00.000Z",
                "from": "Sender <sender@z.com>",
                "to": ["alias@x.com"],
                "bcc": [],
                "cc": ["cc@z.com"],
                "message_id": "<abc@z.com>",
                "subject": "Hello",
                "attachments": [{
                    "id": "att_1",
                    "filename": "a.txt",
                    "content_type": "text/plain",
                    "content_disposition": "attachment",
                    "content_id": ""
                }]
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        match &event {
            WebhookEvent::Received { data } => {
                assert_eq!(data.to, vec!["alias@x.com".to_string()]);
                assert_eq!(data.subject, "Hello");
                assert_eq!(data.attachments[0].filename, "a.txt");
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert_eq!(event.kind(), "email.received");
        assert_eq!(event.email_id(), "in_1");
    }

    #[test]
    fn test_failed_deserialization() {
        let json = r#"{
            "type": "email.failed",
            "data": {
                "email_id": "out_1",
                "to": ["me@y.com"],
                "subject": "Hello",
                "failed": {"reason": "mailbox full"},
                "tags": {"category": "forward"}
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        match event {
            WebhookEvent::Failed { data } => assert_eq!(data.failed.reason, "mailbox full"),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_only_parses_as_envelope() {
        let json = r#"{"type": "email.opened", "data": {"email_id": "out_1"}}"#;

        let envelope: WebhookEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.kind, "email.opened");
        assert!(!SUPPORTED_TYPES.contains(&envelope.kind.as_str()));
        assert!(serde_json::from_str::<WebhookEvent>(json).is_err());
    }

    #[test]
    fn test_null_lists_are_empty() {
        let json = r#"{
            "type": "email.received",
            "data": {
                "email_id": "in_1",
                "from": "sender@z.com",
                "to": ["alias@x.com"],
                "cc": null,
                "bcc": null,
                "subject": null,
                "attachments": null
            }
        }"#;

        match serde_json::from_str::<WebhookEvent>(json).unwrap() {
            WebhookEvent::Received { data } => {
                assert!(data.cc.is_empty());
                assert!(data.bcc.is_empty());
                assert!(data.attachments.is_empty());
                assert_eq!(data.subject, "");
            }
            other => panic!("unexpected variant {other:?}"),
        }

        let json = r#"{"type": "email.failed", "data": {"email_id": "out_1", "to": null, "failed": null}}"#;
        match serde_json::from_str::<WebhookEvent>(json).unwrap() {
            WebhookEvent::Failed { data } => {
                assert!(data.to.is_empty());
                assert_eq!(data.failed.reason, "");
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_missing_email_id_is_rejected() {
        let json = r#"{"type": "email.delivered", "data": {"to": ["me@y.com"]}}"#;
        assert!(serde_json::from_str::<WebhookEvent>(json).is_err());
    }
}
