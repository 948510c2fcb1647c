//! In-memory record store.
//!
//! Each mutation takes the relevant write lock once, so every write is an
//! independent, atomic record update. Clones share the same data.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{new_record_id, LogFilter, RecordStore, StoreError};
use crate::model::{
    EventLog, EventStatus, ForwardingEvent, ForwardingRule, NewEventLog, NewForwardingEvent,
    SecretKind, StoredSecret,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    // Insertion order matters for "first match" lookups.
    rules: RwLock<Vec<ForwardingRule>>,
    secrets: RwLock<Vec<StoredSecret>>,
    events: RwLock<HashMap<String, ForwardingEvent>>,
    logs: RwLock<Vec<EventLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all forwarding events, oldest first.
    pub async fn events(&self) -> Vec<ForwardingEvent> {
        let events = self.inner.events.read().await;
        let mut all: Vec<_> = events.values().cloned().collect();
        all.sort_by_key(|e| e.created);
        all
    }

    /// Snapshot of all audit entries in append order.
    pub async fn logs(&self) -> Vec<EventLog> {
        self.inner.logs.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_rule_by_email(
        &self,
        rule_email: &str,
    ) -> Result<Option<ForwardingRule>, StoreError> {
        let rules = self.inner.rules.read().await;
        Ok(rules.iter().find(|r| r.rule_email == rule_email).cloned())
    }

    async fn insert_rule(&self, mut rule: ForwardingRule) -> Result<(), StoreError> {
        if rule.id.is_empty() {
            rule.id = new_record_id();
        }
        self.inner.rules.write().await.push(rule);
        Ok(())
    }

    async fn find_secret(
        &self,
        owner: &str,
        kind: SecretKind,
    ) -> Result<Option<StoredSecret>, StoreError> {
        let secrets = self.inner.secrets.read().await;
        Ok(secrets
            .iter()
            .find(|s| s.owner == owner && s.kind == kind)
            .cloned())
    }

    async fn insert_secret(&self, mut secret: StoredSecret) -> Result<(), StoreError> {
        if secret.id.is_empty() {
            secret.id = new_record_id();
        }
        self.inner.secrets.write().await.push(secret);
        Ok(())
    }

    async fn insert_event(
        &self,
        event: NewForwardingEvent,
    ) -> Result<ForwardingEvent, StoreError> {
        let now = Utc::now();
        let record = ForwardingEvent {
            id: new_record_id(),
            owner: event.owner,
            rule: event.rule,
            received_email_id: event.received_email_id,
            sent_email_id: None,
            status: EventStatus::Pending,
            subject: event.subject,
            from: event.from,
            to: event.to,
            error: None,
            created: now,
            updated: now,
        };

        self.inner
            .events
            .write()
            .await
            .insert(record.id.clone(), record.clone());

        Ok(record)
    }

    async fn get_event(&self, id: &str) -> Result<Option<ForwardingEvent>, StoreError> {
        Ok(self.inner.events.read().await.get(id).cloned())
    }

    async fn save_event(&self, event: &ForwardingEvent) -> Result<(), StoreError> {
        let mut events = self.inner.events.write().await;
        match events.get_mut(&event.id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: "forwarding_events",
                id: event.id.clone(),
            }),
        }
    }

    async fn find_event_by_sent_id(
        &self,
        sent_email_id: &str,
    ) -> Result<Option<ForwardingEvent>, StoreError> {
        let events = self.inner.events.read().await;
        Ok(events
            .values()
            .filter(|e| e.sent_email_id.as_deref() == Some(sent_email_id))
            .min_by_key(|e| e.created)
            .cloned())
    }

    async fn find_events_by_received_id(
        &self,
        received_email_id: &str,
    ) -> Result<Vec<ForwardingEvent>, StoreError> {
        let events = self.inner.events.read().await;
        let mut found: Vec<_> = events
            .values()
            .filter(|e| e.received_email_id == received_email_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created);
        Ok(found)
    }

    async fn delete_events_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut events = self.inner.events.write().await;
        let before = events.len();
        events.retain(|_, e| e.created >= cutoff);
        Ok(before - events.len())
    }

    async fn append_log(&self, entry: NewEventLog) -> Result<EventLog, StoreError> {
        let record = EventLog {
            id: new_record_id(),
            owner: entry.owner,
            rule: entry.rule,
            event: entry.event,
            kind: entry.kind,
            metadata: entry.metadata,
            created: Utc::now(),
        };

        self.inner.logs.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_logs(&self, filter: &LogFilter) -> Result<Vec<EventLog>, StoreError> {
        let logs = self.inner.logs.read().await;
        Ok(logs
            .iter()
            .filter(|l| filter.owner.as_ref().map_or(true, |o| &l.owner == o))
            .filter(|l| {
                filter
                    .event
                    .as_ref()
                    .map_or(true, |e| l.event.as_ref() == Some(e))
            })
            .cloned()
            .collect())
    }
}
