//! Resend HTTP API client.
//!
//! Reference: https://resend.com/docs/api-reference

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;

use super::{AttachmentMeta, EmailProvider, OutboundEmail, ProviderError, ReceivedEmail};

/// Shared client; cheap to clone.
#[derive(Clone)]
pub struct ResendClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    cc: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    bcc: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SendAttachment<'a>>,
}

impl<'a> SendEmailRequest<'a> {
    fn from_email(email: &'a OutboundEmail) -> Self {
        SendEmailRequest {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            html: email.html.as_deref(),
            text: email.text.as_deref(),
            cc: &email.cc,
            bcc: &email.bcc,
            reply_to: email.reply_to.as_deref(),
            attachments: email
                .attachments
                .iter()
                .map(|a| SendAttachment {
                    filename: &a.filename,
                    content: STANDARD.encode(&a.content),
                    content_type: &a.content_type,
                    content_id: a.content_id.as_deref(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct SendAttachment<'a> {
    filename: &'a str,
    /// Base64-encoded bytes
    content: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Deserialize)]
struct AttachmentList {
    #[serde(default)]
    data: Vec<AttachmentMeta>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl ResendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;

        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turn a non-2xx response into `ProviderError::Api` with the provider's message.
async fn check_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl EmailProvider for ResendClient {
    async fn get_received_email(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<ReceivedEmail, ProviderError> {
        let url = self.endpoint(&["emails", "receiving", email_id])?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        let email: ReceivedEmail = check_status(resp).await?.json().await?;

        info!(
            received_email_id = %email_id,
            has_html = email.html.is_some(),
            has_text = email.text.is_some(),
            attachment_count = email.attachments.len(),
            "resend_received_email_fetched"
        );

        Ok(email)
    }

    async fn list_attachments(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<Vec<AttachmentMeta>, ProviderError> {
        let url = self.endpoint(&["emails", "receiving", email_id, "attachments"])?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        let list: AttachmentList = check_status(resp).await?.json().await?;

        info!(
            received_email_id = %email_id,
            attachment_count = list.data.len(),
            "resend_attachments_listed"
        );

        Ok(list.data)
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(error = %e, "resend_attachment_download_timeout");
                }
                ProviderError::from(e)
            })?;

        let bytes = check_status(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn send_email(
        &self,
        api_key: &str,
        email: &OutboundEmail,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint(&["emails"])?;

        let body = SendEmailRequest::from_email(email);

        let resp = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let sent: SendEmailResponse = check_status(resp).await?.json().await?;

        info!(
            sent_email_id = %sent.id,
            to = ?email.to,
            attachment_count = email.attachments.len(),
            "resend_email_sent"
        );

        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Attachment;

    fn client() -> ResendClient {
        ResendClient::new("https://api.resend.com", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_building() {
        let url = client().endpoint(&["emails", "receiving", "abc-123"]).unwrap();
        assert_eq!(url.as_str(), "https://api.resend.com/emails/receiving/abc-123");
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let url = client().endpoint(&["emails", "receiving", "a/b?c"]).unwrap();
        assert_eq!(url.as_str(), "https://api.resend.com/emails/receiving/a%2Fb%3Fc");
    }

    #[test]
    fn test_endpoint_with_base_path() {
        let c = ResendClient::new("http://localhost:9000/mock/", Duration::from_secs(5)).unwrap();
        let url = c.endpoint(&["emails"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/mock/emails");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ResendClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(ResendClient::new("mailto:me@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_send_request_serialization() {
        let email = OutboundEmail {
            from: "fwd@x.com".to_string(),
            to: vec!["me@y.com".to_string()],
            subject: "Hello".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            text: None,
            cc: vec![],
            bcc: vec![],
            reply_to: Some("sender@z.com".to_string()),
            attachments: vec![Attachment {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                content_id: None,
                content: b"hello".to_vec(),
            }],
        };

        let body = SendEmailRequest::from_email(&email);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["to"], serde_json::json!(["me@y.com"]));
        assert_eq!(json["reply_to"], "sender@z.com");
        assert_eq!(json["attachments"][0]["content"], "aGVsbG8=");
        assert!(json.get("text").is_none());
        assert!(json.get("cc").is_none());
    }

    #[test]
    fn test_attachment_list_deserialization() {
        let json = r#"{
            "object": "list",
            "has_more": false,
            "data": [{
                "id": "att_1",
                "filename": "invoice.pdf",
                "size": 1024,
                "content_type": "application/pdf",
                "content_disposition": "attachment",
                "content_id": null,
                "download_url": "https://files.example.com/att_1",
                "expires_at": "2025-01-01T00:00:00Z"
            }]
        }"#;

        let list: AttachmentList = serde_json::from_str(json).unwrap();
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].filename, "invoice.pdf");
        assert_eq!(list.data[0].download_url, "https://files.example.com/att_1");
        assert!(list.data[0].content_id.is_none());
    }

    #[test]
    fn test_received_email_deserialization() {
        let json = r#"{
            "object": "email",
            "id": "in_1",
            "to": ["alias@x.com"],
            "from": "Sender <sender@z.com>",
            "created_at": "2025-01-01T00:00:00Z",
            "subject": "Hello",
            "html": "<p>Hi</p>",
            "text": null,
            "bcc": null,
            "cc": ["cc@z.com"],
            "attachments": [{"id": "att_1", "filename": "a.txt", "content_type": "text/plain"}]
        }"#;

        let email: ReceivedEmail = serde_json::from_str(json).unwrap();
        assert_eq!(email.from, "Sender <sender@z.com>");
        assert_eq!(email.cc, Some(vec!["cc@z.com".to_string()]));
        assert!(email.bcc.is_none());
        assert!(email.text.is_none());
        assert_eq!(email.attachments.len(), 1);
    }
}
