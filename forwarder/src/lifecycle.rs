//! Forwarding Event State Machine.
//!
//! ```text
//! pending ──► sent ──► delivered
//!    │          │
//!    └──────────┴────► failed
//! ```
//!
//! Updates that are not an edge of this graph are rejected without writing.
//! Repeating the current status is a no-op, which keeps duplicate lifecycle
//! webhooks harmless.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::model::{ErrorPayload, EventStatus, ForwardingEvent, NewForwardingEvent};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("forwarding event {0} not found")]
    EventNotFound(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    #[error("forwarding event {0} already has a sent message id")]
    SentIdAlreadySet(String),

    #[error("a sent message id can only be attached on the sent transition")]
    SentIdOutsideSent,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a status update that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The event moved to the requested status.
    Applied,
    /// The event was already in the requested status; nothing was written.
    Unchanged,
}

/// A requested status change.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: EventStatus,
    pub sent_email_id: Option<String>,
    pub error: Option<ErrorPayload>,
}

impl StatusUpdate {
    pub fn sent(sent_email_id: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Sent,
            sent_email_id: Some(sent_email_id.into()),
            error: None,
        }
    }

    pub fn delivered() -> Self {
        Self {
            status: EventStatus::Delivered,
            sent_email_id: None,
            error: None,
        }
    }

    pub fn failed(error: ErrorPayload) -> Self {
        Self {
            status: EventStatus::Failed,
            sent_email_id: None,
            error: Some(error),
        }
    }

    /// Re-affirm `sent` without attaching an id (lifecycle `email.sent`).
    pub fn sent_confirmed() -> Self {
        Self {
            status: EventStatus::Sent,
            sent_email_id: None,
            error: None,
        }
    }
}

/// Creates and advances forwarding events.
#[derive(Clone)]
pub struct ForwardingEvents {
    store: Arc<dyn RecordStore>,
}

impl ForwardingEvents {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create an event in `pending`.
    pub async fn create_event(
        &self,
        event: NewForwardingEvent,
    ) -> Result<ForwardingEvent, LifecycleError> {
        let created = self.store.insert_event(event).await?;

        info!(
            event_id = %created.id,
            received_email_id = %created.received_email_id,
            rule_id = %created.rule,
            "forwarding_event_created"
        );

        Ok(created)
    }

    /// Move an event to `update.status`, enforcing the transition graph.
    pub async fn update_status(
        &self,
        event_id: &str,
        update: StatusUpdate,
    ) -> Result<Transition, LifecycleError> {
        let mut event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| LifecycleError::EventNotFound(event_id.to_string()))?;

        if event.status == update.status {
            if let (Some(existing), Some(requested)) = (&event.sent_email_id, &update.sent_email_id)
            {
                if existing != requested {
                    return Err(LifecycleError::SentIdAlreadySet(event.id));
                }
            }

            debug!(
                event_id = %event.id,
                status = %event.status,
                "forwarding_event_status_unchanged"
            );
            return Ok(Transition::Unchanged);
        }

        if !event.status.can_transition_to(update.status) {
            warn!(
                event_id = %event.id,
                from = %event.status,
                to = %update.status,
                terminal = event.status.is_terminal(),
                "forwarding_event_transition_refused"
            );
            return Err(LifecycleError::InvalidTransition {
                from: event.status,
                to: update.status,
            });
        }

        if let Some(sent_email_id) = update.sent_email_id {
            if update.status != EventStatus::Sent {
                return Err(LifecycleError::SentIdOutsideSent);
            }
            if event.sent_email_id.is_some() {
                return Err(LifecycleError::SentIdAlreadySet(event.id));
            }
            event.sent_email_id = Some(sent_email_id);
        }

        if let Some(error) = update.error {
            event.error = Some(error);
        }

        let previous = event.status;
        event.status = update.status;
        event.updated = Utc::now();

        self.store.save_event(&event).await?;

        info!(
            event_id = %event.id,
            from = %previous,
            to = %event.status,
            sent_email_id = ?event.sent_email_id,
            "forwarding_event_status_updated"
        );

        Ok(Transition::Applied)
    }

    /// Event whose outbound message has `sent_email_id`.
    pub async fn find_by_message_id(
        &self,
        sent_email_id: &str,
    ) -> Result<Option<ForwardingEvent>, LifecycleError> {
        Ok(self.store.find_event_by_sent_id(sent_email_id).await?)
    }

    /// An event for this inbound message that is still live, if any.
    ///
    /// Failed attempts do not count, and neither do attempts left `pending`
    /// for longer than `pending_timeout`, so a redelivered webhook may retry
    /// them.
    pub async fn find_active_by_received_id(
        &self,
        received_email_id: &str,
        pending_timeout: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<ForwardingEvent>, LifecycleError> {
        let events = self.store.find_events_by_received_id(received_email_id).await?;
        Ok(events.into_iter().find(|e| match e.status {
            EventStatus::Failed => false,
            EventStatus::Pending => now - e.updated < pending_timeout,
            EventStatus::Sent | EventStatus::Delivered => true,
        }))
    }
}
