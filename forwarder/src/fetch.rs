//! Content Fetcher: inbound message body and attachments.
//!
//! The body is mandatory. Attachments are best-effort: a failed listing
//! yields no attachments, a failed download drops only that attachment, and
//! every loss is reported back as an [`AttachmentFailure`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FailureReason, ForwardError};
use crate::provider::{Attachment, EmailProvider};

/// Body and addressing of the inbound message needed for forwarding.
#[derive(Debug, Clone, Default)]
pub struct ReceivedContent {
    pub html: Option<String>,
    pub text: Option<String>,
    pub from: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub has_attachments: bool,
}

/// Where an attachment was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStage {
    List,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentFailure {
    /// Unknown when the listing itself failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub stage: AttachmentStage,
    pub error: String,
}

/// Possibly partial set of attachments plus what was lost.
#[derive(Debug, Default)]
pub struct AttachmentCollection {
    pub attachments: Vec<Attachment>,
    pub failures: Vec<AttachmentFailure>,
}

impl AttachmentCollection {
    pub fn listing_failed(&self) -> bool {
        self.failures.iter().any(|f| f.stage == AttachmentStage::List)
    }
}

#[derive(Clone)]
pub struct ContentFetcher {
    provider: Arc<dyn EmailProvider>,
}

impl ContentFetcher {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self { provider }
    }

    pub async fn fetch_body(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<ReceivedContent, ForwardError> {
        let email = match self.provider.get_received_email(api_key, email_id).await {
            Ok(email) => email,
            Err(e) => {
                warn!(
                    received_email_id = %email_id,
                    error = %e,
                    "email_content_fetch_failed"
                );
                return Err(ForwardError::not_found(
                    FailureReason::EmailContentFetchFailed,
                    "unable to get email content",
                ));
            }
        };

        Ok(ReceivedContent {
            html: email.html,
            text: email.text,
            from: email.from,
            cc: email.cc.unwrap_or_default(),
            bcc: email.bcc.unwrap_or_default(),
            has_attachments: !email.attachments.is_empty(),
        })
    }

    /// List attachments, then download them one at a time.
    pub async fn collect_attachments(&self, api_key: &str, email_id: &str) -> AttachmentCollection {
        let mut collection = AttachmentCollection::default();

        let listed = match self.provider.list_attachments(api_key, email_id).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(
                    received_email_id = %email_id,
                    error = %e,
                    "attachment_list_failed"
                );
                collection.failures.push(AttachmentFailure {
                    filename: None,
                    stage: AttachmentStage::List,
                    error: e.to_string(),
                });
                return collection;
            }
        };

        for meta in listed {
            match self.provider.download_attachment(&meta.download_url).await {
                Ok(content) => collection.attachments.push(Attachment {
                    filename: meta.filename,
                    content_type: meta.content_type,
                    content_id: meta.content_id.filter(|id| !id.is_empty()),
                    content,
                }),
                Err(e) => {
                    warn!(
                        received_email_id = %email_id,
                        filename = %meta.filename,
                        error = %e,
                        "attachment_download_failed"
                    );
                    collection.failures.push(AttachmentFailure {
                        filename: Some(meta.filename),
                        stage: AttachmentStage::Download,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            received_email_id = %email_id,
            collected = collection.attachments.len(),
            skipped = collection.failures.len(),
            "attachments_collected"
        );

        collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;
    use crate::provider::{AttachmentMeta, AttachmentSummary, ReceivedEmail};
    use axum::http::StatusCode;

    fn meta(name: &str, url: &str) -> AttachmentMeta {
        AttachmentMeta {
            id: format!("att_{name}"),
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            content_id: Some(String::new()),
            download_url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_body() {
        let provider = FakeProvider::new().with_email(ReceivedEmail {
            id: "in_1".to_string(),
            from: "sender@z.com".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            cc: Some(vec!["cc@z.com".to_string()]),
            attachments: vec![AttachmentSummary::default()],
            ..Default::default()
        });
        let fetcher = ContentFetcher::new(Arc::new(provider));

        let content = fetcher.fetch_body("re_key", "in_1").await.unwrap();
        assert_eq!(content.from, "sender@z.com");
        assert_eq!(content.html.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(content.cc, vec!["cc@z.com".to_string()]);
        assert!(content.bcc.is_empty());
        assert!(content.has_attachments);
    }

    #[tokio::test]
    async fn test_fetch_body_failure() {
        let fetcher = ContentFetcher::new(Arc::new(FakeProvider::new()));

        let err = fetcher.fetch_body("re_key", "missing").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.reason(), Some(FailureReason::EmailContentFetchFailed));
    }

    #[tokio::test]
    async fn test_partial_download_keeps_the_rest() {
        let provider = FakeProvider::new()
            .with_attachments(
                "in_1",
                vec![
                    meta("a.txt", "https://files/a"),
                    meta("b.txt", "https://files/b"),
                    meta("c.txt", "https://files/c"),
                ],
            )
            .with_download("https://files/a", b"aaa")
            .with_download("https://files/c", b"ccc");
        let fetcher = ContentFetcher::new(Arc::new(provider));

        let collection = fetcher.collect_attachments("re_key", "in_1").await;

        let names: Vec<_> = collection.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
        assert_eq!(collection.attachments[1].content, b"ccc".to_vec());
        assert!(collection.attachments[0].content_id.is_none());

        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].filename.as_deref(), Some("b.txt"));
        assert_eq!(collection.failures[0].stage, AttachmentStage::Download);
        assert!(!collection.listing_failed());
    }

    #[tokio::test]
    async fn test_listing_failure_yields_no_attachments() {
        let provider = FakeProvider::new().failing_listing();
        let fetcher = ContentFetcher::new(Arc::new(provider));

        let collection = fetcher.collect_attachments("re_key", "in_1").await;

        assert!(collection.attachments.is_empty());
        assert!(collection.listing_failed());
        assert!(collection.failures[0].filename.is_none());
    }

    #[test]
    fn test_failure_serialization() {
        let failure = AttachmentFailure {
            filename: Some("b.txt".to_string()),
            stage: AttachmentStage::Download,
            error: "link expired".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"filename": "b.txt", "stage": "download", "error": "link expired"})
        );
    }
}
