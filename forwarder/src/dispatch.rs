//! Forward Dispatcher: compose and send the forwarded copy.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{FailureReason, ForwardError};
use crate::fetch::ReceivedContent;
use crate::model::ForwardingRule;
use crate::provider::{Attachment, EmailProvider, OutboundEmail};

#[derive(Clone)]
pub struct ForwardDispatcher {
    provider: Arc<dyn EmailProvider>,
}

impl ForwardDispatcher {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self { provider }
    }

    /// Outbound copy of an inbound message under `rule`.
    ///
    /// Replies go to the original sender; cc and bcc are carried over.
    pub fn compose(
        rule: &ForwardingRule,
        subject: &str,
        content: ReceivedContent,
        attachments: Vec<Attachment>,
    ) -> OutboundEmail {
        let reply_to = Some(content.from).filter(|f| !f.trim().is_empty());

        OutboundEmail {
            from: rule.send_from_email.clone(),
            to: vec![rule.forward_to_email.clone()],
            subject: subject.to_string(),
            html: content.html,
            text: content.text,
            cc: content.cc,
            bcc: content.bcc,
            reply_to,
            attachments,
        }
    }

    /// Send `email`; returns the provider id of the outbound message.
    pub async fn send(&self, api_key: &str, email: &OutboundEmail) -> Result<String, ForwardError> {
        match self.provider.send_email(api_key, email).await {
            Ok(sent_email_id) => {
                info!(
                    sent_email_id = %sent_email_id,
                    to = ?email.to,
                    attachment_count = email.attachments.len(),
                    "forward_sent"
                );
                Ok(sent_email_id)
            }
            Err(e) => {
                error!(error = %e, to = ?email.to, "forward_send_failed");
                Err(ForwardError::ExternalService {
                    reason: FailureReason::EmailSendFailed,
                    message: "failed to send email".to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;
    use axum::http::StatusCode;

    fn rule() -> ForwardingRule {
        ForwardingRule {
            id: "rule_1".to_string(),
            owner: "user_1".to_string(),
            rule_email: "alias@x.com".to_string(),
            forward_to_email: "me@y.com".to_string(),
            send_from_email: "fwd@x.com".to_string(),
        }
    }

    fn content() -> ReceivedContent {
        ReceivedContent {
            html: Some("<p>Hi</p>".to_string()),
            text: Some("Hi".to_string()),
            from: "sender@z.com".to_string(),
            cc: vec!["cc@z.com".to_string()],
            bcc: vec!["bcc@z.com".to_string()],
            has_attachments: false,
        }
    }

    #[test]
    fn test_compose() {
        let email = ForwardDispatcher::compose(&rule(), "Hello", content(), vec![]);

        assert_eq!(email.from, "fwd@x.com");
        assert_eq!(email.to, vec!["me@y.com".to_string()]);
        assert_eq!(email.subject, "Hello");
        assert_eq!(email.reply_to.as_deref(), Some("sender@z.com"));
        assert_eq!(email.cc, vec!["cc@z.com".to_string()]);
        assert_eq!(email.bcc, vec!["bcc@z.com".to_string()]);
        assert_eq!(email.text.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_compose_without_sender_has_no_reply_to() {
        let mut c = content();
        c.from = String::new();

        let email = ForwardDispatcher::compose(&rule(), "Hello", c, vec![]);
        assert!(email.reply_to.is_none());
    }

    #[tokio::test]
    async fn test_send() {
        let provider = Arc::new(FakeProvider::new());
        let dispatcher = ForwardDispatcher::new(provider.clone());
        let email = ForwardDispatcher::compose(&rule(), "Hello", content(), vec![]);

        let id = dispatcher.send("re_key", &email).await.unwrap();

        assert_eq!(id, "out_1");
        assert_eq!(provider.sent(), vec![email]);
        assert_eq!(provider.api_keys_seen(), vec!["re_key".to_string()]);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_provider_text() {
        let provider = Arc::new(FakeProvider::new().failing_send("domain not verified"));
        let dispatcher = ForwardDispatcher::new(provider);
        let email = ForwardDispatcher::compose(&rule(), "Hello", content(), vec![]);

        let err = dispatcher.send("re_key", &email).await.unwrap_err();

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.reason(), Some(FailureReason::EmailSendFailed));
        assert!(err.detail().unwrap().contains("domain not verified"));
    }
}
