//! Per-webhook orchestration.
//!
//! One [`Forwarder::handle`] call is one unit of work: every step runs in
//! sequence and the call always ends in an HTTP status.
//!
//! ## `email.received`
//!
//! ```text
//! resolve rule ─► dedup ─► create event ─► webhook secret ─► verify
//!      │                                                       │
//!     404                      api key ◄───────────────────────┘
//!                                 │
//!                     body ─► attachments ─► send ─► sent
//! ```
//!
//! Once the event exists, any failure records an `error` audit entry and
//! moves the event to `failed` with its reason code.
//!
//! ## Lifecycle webhooks
//!
//! `email.sent`, `email.delivered` and `email.failed` locate the event by
//! outbound message id. Unknown ids are acknowledged without side effects.
//! Updates the state machine refuses are acknowledged and audited with
//! `transition_applied: false`.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::audit::AuditLogger;
use crate::dispatch::ForwardDispatcher;
use crate::error::{FailureReason, ForwardError};
use crate::fetch::{AttachmentCollection, ContentFetcher};
use crate::lifecycle::{ForwardingEvents, LifecycleError, StatusUpdate, Transition};
use crate::model::{
    AuditEventType, ErrorPayload, ForwardingEvent, ForwardingRule, NewForwardingEvent, SecretKind,
};
use crate::provider::EmailProvider;
use crate::rules::RuleResolver;
use crate::store::RecordStore;
use crate::vault::SecretVault;
use crate::web::payload::{
    FailedData, OutboundData, ReceivedData, WebhookEnvelope, WebhookEvent, SUPPORTED_TYPES,
};
use crate::web::signature::WebhookVerifier;

/// HTTP-level result of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: StatusCode,
    pub error: Option<String>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            error: None,
        }
    }

    fn from_error(err: &ForwardError) -> Self {
        Self {
            status: err.status_code(),
            error: Some(err.to_string()),
        }
    }
}

/// The forwarding pipeline and its collaborators.
pub struct Forwarder {
    store: Arc<dyn RecordStore>,
    vault: Arc<SecretVault>,
    rules: RuleResolver,
    events: ForwardingEvents,
    audit: AuditLogger,
    fetcher: ContentFetcher,
    dispatcher: ForwardDispatcher,
    tolerance_seconds: u64,
    pending_timeout: chrono::Duration,
}

/// How long a `pending` event blocks a redelivered `email.received`.
pub const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 600;

impl Forwarder {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn EmailProvider>,
        vault: Arc<SecretVault>,
        tolerance_seconds: u64,
    ) -> Self {
        Self {
            rules: RuleResolver::new(store.clone()),
            events: ForwardingEvents::new(store.clone()),
            audit: AuditLogger::new(store.clone()),
            fetcher: ContentFetcher::new(provider.clone()),
            dispatcher: ForwardDispatcher::new(provider),
            store,
            vault,
            tolerance_seconds,
            pending_timeout: pending_timeout(DEFAULT_PENDING_TIMEOUT_SECS),
        }
    }

    /// Override how long an unfinished attempt suppresses redelivery.
    pub fn with_pending_timeout(mut self, seconds: u64) -> Self {
        self.pending_timeout = pending_timeout(seconds);
        self
    }

    /// Process one webhook delivery: raw body plus request headers.
    pub async fn handle(&self, body: &[u8], headers: &HeaderMap) -> Outcome {
        let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, body_length = body.len(), "webhook_payload_invalid");
                return Outcome::from_error(&ForwardError::Validation(e.to_string()));
            }
        };

        if !SUPPORTED_TYPES.contains(&envelope.kind.as_str()) {
            info!(webhook_type = %envelope.kind, "webhook_type_ignored");
            return Outcome::ok();
        }

        let event: WebhookEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    webhook_type = %envelope.kind,
                    error = %e,
                    "webhook_payload_invalid"
                );
                return Outcome::from_error(&ForwardError::Validation(e.to_string()));
            }
        };

        let kind = event.kind();
        info!(
            webhook_type = kind,
            email_id = %event.email_id(),
            "webhook_received"
        );

        let result = match event {
            WebhookEvent::Received { data } => self.handle_received(data, body, headers).await,
            WebhookEvent::Sent { data } => self.handle_sent(data).await,
            WebhookEvent::Delivered { data } => self.handle_delivered(data).await,
            WebhookEvent::Failed { data } => self.handle_failed(data).await,
        };

        match result {
            Ok(()) => Outcome::ok(),
            Err(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    error!(
                        webhook_type = kind,
                        status = status.as_u16(),
                        reason = ?e.reason(),
                        error = %e,
                        "webhook_failed"
                    );
                } else {
                    warn!(
                        webhook_type = kind,
                        status = status.as_u16(),
                        reason = ?e.reason(),
                        error = %e,
                        "webhook_rejected"
                    );
                }
                Outcome::from_error(&e)
            }
        }
    }

    // =========================================================================
    // email.received
    // =========================================================================

    async fn handle_received(
        &self,
        data: ReceivedData,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<(), ForwardError> {
        let recipient = data.to.first().ok_or_else(|| {
            ForwardError::Validation("email.received without recipients".to_string())
        })?;

        let rule = self.rules.resolve(recipient).await?;

        let active = self
            .events
            .find_active_by_received_id(&data.email_id, self.pending_timeout, Utc::now())
            .await?;
        if let Some(existing) = active {
            info!(
                received_email_id = %data.email_id,
                event_id = %existing.id,
                status = %existing.status,
                "forward_duplicate_ignored"
            );
            return Ok(());
        }

        let event = self
            .events
            .create_event(NewForwardingEvent {
                owner: rule.owner.clone(),
                rule: rule.id.clone(),
                received_email_id: data.email_id.clone(),
                subject: data.subject.clone(),
                from: data.from.clone(),
                to: recipient.clone(),
            })
            .await?;

        self.audit
            .log(
                &rule.owner,
                &rule.id,
                Some(&event.id),
                AuditEventType::WebhookReceived,
                json!({
                    "received_email_id": data.email_id,
                    "from": data.from,
                    "to": data.to,
                    "subject": data.subject,
                }),
            )
            .await;

        let sent_email_id = match self.forward(&rule, &event, &data, body, headers).await {
            Ok(id) => id,
            Err(e) => {
                self.fail_event(&rule, &event, &e).await;
                return Err(e);
            }
        };

        // The message is out; a failed write here must not trigger a resend.
        if let Err(e) = self
            .events
            .update_status(&event.id, StatusUpdate::sent(sent_email_id.as_str()))
            .await
        {
            error!(
                event_id = %event.id,
                sent_email_id = %sent_email_id,
                error = %e,
                "forward_status_update_failed"
            );
        }

        info!(
            event_id = %event.id,
            received_email_id = %data.email_id,
            sent_email_id = %sent_email_id,
            "forward_completed"
        );

        Ok(())
    }

    /// Verify, fetch and send; returns the outbound message id.
    async fn forward(
        &self,
        rule: &ForwardingRule,
        event: &ForwardingEvent,
        data: &ReceivedData,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<String, ForwardError> {
        let secret = self.open_secret(&rule.owner, SecretKind::WebhookSecret).await?;

        let verifier = WebhookVerifier::new(&secret, self.tolerance_seconds).map_err(|e| {
            warn!(owner = %rule.owner, error = %e, "webhook_verifier_creation_failed");
            ForwardError::Internal {
                reason: FailureReason::WebhookVerifierCreationFailed,
                message: "unable to create webhook verifier".to_string(),
            }
        })?;

        verifier.verify(body, headers).map_err(|e| {
            warn!(event_id = %event.id, error = %e, "webhook_signature_invalid");
            ForwardError::Security {
                reason: FailureReason::InvalidWebhookSignature,
                message: "invalid webhook signature".to_string(),
            }
        })?;

        let api_key = self.open_secret(&rule.owner, SecretKind::ApiKey).await?;

        let content = self.fetcher.fetch_body(&api_key, &data.email_id).await?;

        let collection = if content.has_attachments || !data.attachments.is_empty() {
            self.fetcher
                .collect_attachments(&api_key, &data.email_id)
                .await
        } else {
            AttachmentCollection::default()
        };

        if collection.listing_failed() {
            self.audit
                .log(
                    &rule.owner,
                    &rule.id,
                    Some(&event.id),
                    AuditEventType::Error,
                    json!({
                        "message": "failed to list attachments",
                        "received_email_id": data.email_id,
                    }),
                )
                .await;
        }

        self.audit
            .log(
                &rule.owner,
                &rule.id,
                Some(&event.id),
                AuditEventType::ForwardInitiated,
                json!({
                    "received_email_id": data.email_id,
                    "subject": data.subject,
                    "attachment_count": collection.attachments.len(),
                    "skipped_attachments": collection.failures,
                }),
            )
            .await;

        let outbound =
            ForwardDispatcher::compose(rule, &data.subject, content, collection.attachments);

        self.dispatcher.send(&api_key, &outbound).await
    }

    /// Look up and decrypt one of the owner's secrets.
    async fn open_secret(&self, owner: &str, kind: SecretKind) -> Result<String, ForwardError> {
        let (missing, undecryptable, label) = match kind {
            SecretKind::WebhookSecret => (
                FailureReason::WebhookSecretNotFound,
                FailureReason::WebhookSecretDecryptionFailed,
                "webhook secret",
            ),
            SecretKind::ApiKey => (
                FailureReason::ApiKeyNotFound,
                FailureReason::ApiKeyDecryptionFailed,
                "resend api key",
            ),
        };

        let stored = self
            .store
            .find_secret(owner, kind)
            .await?
            .ok_or_else(|| ForwardError::not_found(missing, format!("{label} not found")))?;

        self.vault.decrypt_string(&stored.ciphertext).map_err(|e| {
            warn!(
                owner = %owner,
                secret_kind = kind.as_str(),
                error = %e,
                "secret_decryption_failed"
            );
            ForwardError::Internal {
                reason: undecryptable,
                message: format!("unable to decrypt {label}"),
            }
        })
    }

    /// Record a failure on an existing event: `error` audit entry, then `failed`.
    async fn fail_event(&self, rule: &ForwardingRule, event: &ForwardingEvent, err: &ForwardError) {
        let mut metadata = json!({
            "message": err.message(),
            "received_email_id": event.received_email_id,
        });
        if let Some(reason) = err.reason() {
            metadata["reason"] = json!(reason);
        }
        if let Some(detail) = err.detail() {
            metadata["error"] = json!(detail);
        }

        self.audit
            .log(
                &rule.owner,
                &rule.id,
                Some(&event.id),
                AuditEventType::Error,
                metadata,
            )
            .await;

        let Some(payload) = err.error_payload() else {
            return;
        };

        if let Err(e) = self
            .events
            .update_status(&event.id, StatusUpdate::failed(payload))
            .await
        {
            error!(
                event_id = %event.id,
                error = %e,
                "forward_status_update_failed"
            );
        }
    }

    // =========================================================================
    // Lifecycle webhooks
    // =========================================================================

    async fn handle_sent(&self, data: OutboundData) -> Result<(), ForwardError> {
        let Some(event) = self.find_outbound(&data.email_id).await? else {
            return Ok(());
        };

        let Some(applied) = self.advance(&event, StatusUpdate::sent_confirmed()).await? else {
            return Ok(());
        };

        self.audit
            .log(
                &event.owner,
                &event.rule,
                Some(&event.id),
                AuditEventType::EmailSent,
                json!({
                    "sent_email_id": data.email_id,
                    "to": data.to,
                    "subject": data.subject,
                    "transition_applied": applied,
                }),
            )
            .await;

        Ok(())
    }

    async fn handle_delivered(&self, data: OutboundData) -> Result<(), ForwardError> {
        let Some(event) = self.find_outbound(&data.email_id).await? else {
            return Ok(());
        };

        let Some(applied) = self.advance(&event, StatusUpdate::delivered()).await? else {
            return Ok(());
        };

        self.audit
            .log(
                &event.owner,
                &event.rule,
                Some(&event.id),
                AuditEventType::EmailDelivered,
                json!({
                    "sent_email_id": data.email_id,
                    "to": data.to,
                    "subject": data.subject,
                    "transition_applied": applied,
                }),
            )
            .await;

        Ok(())
    }

    async fn handle_failed(&self, data: FailedData) -> Result<(), ForwardError> {
        let Some(event) = self.find_outbound(&data.email_id).await? else {
            return Ok(());
        };

        let reason = data.failed.reason.trim();
        let payload = if reason.is_empty() {
            ErrorPayload::new(FailureReason::DeliveryFailed)
        } else {
            ErrorPayload::with_detail(FailureReason::DeliveryFailed, reason)
        };

        let Some(applied) = self.advance(&event, StatusUpdate::failed(payload)).await? else {
            return Ok(());
        };

        self.audit
            .log(
                &event.owner,
                &event.rule,
                Some(&event.id),
                AuditEventType::EmailFailed,
                json!({
                    "sent_email_id": data.email_id,
                    "to": data.to,
                    "subject": data.subject,
                    "reason": data.failed.reason,
                    "transition_applied": applied,
                }),
            )
            .await;

        Ok(())
    }

    async fn find_outbound(&self, sent_email_id: &str) -> Result<Option<ForwardingEvent>, ForwardError> {
        let event = self.events.find_by_message_id(sent_email_id).await?;
        if event.is_none() {
            info!(sent_email_id = %sent_email_id, "webhook_unknown_message_ignored");
        }
        Ok(event)
    }

    /// Apply a lifecycle update.
    ///
    /// `Some(true)` when the event is now in the requested status, `Some(false)`
    /// when the state machine refused the update, `None` when the event has
    /// disappeared since it was looked up.
    async fn advance(
        &self,
        event: &ForwardingEvent,
        update: StatusUpdate,
    ) -> Result<Option<bool>, ForwardError> {
        let requested = update.status;

        match self.events.update_status(&event.id, update).await {
            Ok(Transition::Applied | Transition::Unchanged) => Ok(Some(true)),
            Err(LifecycleError::InvalidTransition { .. }) => Ok(Some(false)),
            Err(LifecycleError::EventNotFound(id)) => {
                warn!(event_id = %id, status = %requested, "lifecycle_event_vanished");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn pending_timeout(seconds: u64) -> chrono::Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
