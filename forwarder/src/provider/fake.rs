//! Scriptable in-process provider for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AttachmentMeta, EmailProvider, OutboundEmail, ProviderError, ReceivedEmail};

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    emails: HashMap<String, ReceivedEmail>,
    attachment_lists: HashMap<String, Vec<AttachmentMeta>>,
    fail_listing: bool,
    downloads: HashMap<String, Vec<u8>>,
    send_error: Option<String>,
    sent: Vec<(String, OutboundEmail)>,
    api_keys_seen: Vec<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(self, email: ReceivedEmail) -> Self {
        self.state
            .lock()
            .unwrap()
            .emails
            .insert(email.id.clone(), email);
        self
    }

    pub fn with_attachments(self, email_id: &str, list: Vec<AttachmentMeta>) -> Self {
        self.state
            .lock()
            .unwrap()
            .attachment_lists
            .insert(email_id.to_string(), list);
        self
    }

    pub fn with_download(self, url: &str, bytes: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .downloads
            .insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn failing_listing(self) -> Self {
        self.state.lock().unwrap().fail_listing = true;
        self
    }

    pub fn failing_send(self, message: &str) -> Self {
        self.state.lock().unwrap().send_error = Some(message.to_string());
        self
    }

    /// Messages passed to `send_email`, in order.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// API keys presented on account-scoped calls.
    pub fn api_keys_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().api_keys_seen.clone()
    }
}

#[async_trait]
impl EmailProvider for FakeProvider {
    async fn get_received_email(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<ReceivedEmail, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.api_keys_seen.push(api_key.to_string());
        state
            .emails
            .get(email_id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: "Email not found".to_string(),
            })
    }

    async fn list_attachments(
        &self,
        api_key: &str,
        email_id: &str,
    ) -> Result<Vec<AttachmentMeta>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.api_keys_seen.push(api_key.to_string());
        if state.fail_listing {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        Ok(state
            .attachment_lists
            .get(email_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 403,
                message: "link expired".to_string(),
            })
    }

    async fn send_email(
        &self,
        api_key: &str,
        email: &OutboundEmail,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.api_keys_seen.push(api_key.to_string());
        if let Some(message) = &state.send_error {
            return Err(ProviderError::Api {
                status: 422,
                message: message.clone(),
            });
        }
        state.sent.push((api_key.to_string(), email.clone()));
        Ok(format!("out_{}", state.sent.len()))
    }
}
