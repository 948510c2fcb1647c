//! Upstream email provider.
//!
//! The forwarder never speaks SMTP itself. Content retrieval and outbound
//! sending both go through an [`EmailProvider`]; [`ResendClient`] is the
//! production implementation.

pub mod resend;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::null_as_default;

pub use resend::ResendClient;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Inbound message as stored by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceivedEmail {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Option<Vec<String>>,
    #[serde(default)]
    pub bcc: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<AttachmentSummary>,
}

/// Attachment as listed on the inbound message itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
}

/// Attachment metadata from the attachment listing, with a download link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_id: Option<String>,
    pub download_url: String,
}

/// Attachment bytes ready to be re-sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content_id: Option<String>,
    pub content: Vec<u8>,
}

/// Outbound message handed to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Operations the pipeline needs from the upstream provider.
///
/// Account-scoped calls take the owner's decrypted API key.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Full inbound message by provider id.
    async fn get_received_email(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<ReceivedEmail, ProviderError>;

    /// Attachment metadata (with download links) for an inbound message.
    async fn list_attachments(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<Vec<AttachmentMeta>, ProviderError>;

    /// Raw bytes behind an attachment download link.
    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, ProviderError>;

    /// Send a message; returns the provider id of the outbound message.
    async fn send_email(
        &self,
        api_key: &str,
        email: &OutboundEmail,
    ) -> Result<String, ProviderError>;
}
