//! Record store abstraction.
//!
//! The forwarder treats persistence as an external keyed record store. This
//! module defines the operations the pipeline needs, an in-memory
//! implementation, and a seed loader that encrypts secrets on their way in.

pub mod memory;
pub mod seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::model::{
    EventLog, ForwardingEvent, ForwardingRule, NewEventLog, NewForwardingEvent, SecretKind,
    StoredSecret,
};

pub use memory::MemoryStore;
pub use seed::{load_seed, SeedFile};

/// Length of generated record ids.
pub const RECORD_ID_LEN: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("record store backend error: {0}")]
    Backend(String),
}

/// Filter for listing audit entries.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub owner: Option<String>,
    pub event: Option<String>,
}

/// Keyed record store consumed by the pipeline.
///
/// Lookups that may legitimately miss return `Ok(None)`; `Err` is reserved
/// for backend failures.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Rules ───────────────────────────────────────────────────────

    /// First rule whose alias equals `rule_email`.
    async fn find_rule_by_email(&self, rule_email: &str)
        -> Result<Option<ForwardingRule>, StoreError>;

    async fn insert_rule(&self, rule: ForwardingRule) -> Result<(), StoreError>;

    // ── Secrets ─────────────────────────────────────────────────────

    /// Encrypted secret of `kind` belonging to `owner`.
    async fn find_secret(
        &self,
        owner: &str,
        kind: SecretKind,
    ) -> Result<Option<StoredSecret>, StoreError>;

    /// Persist an already-encrypted secret.
    async fn insert_secret(&self, secret: StoredSecret) -> Result<(), StoreError>;

    // ── Forwarding events ───────────────────────────────────────────

    async fn insert_event(&self, event: NewForwardingEvent)
        -> Result<ForwardingEvent, StoreError>;

    async fn get_event(&self, id: &str) -> Result<Option<ForwardingEvent>, StoreError>;

    /// Overwrite an existing event record.
    async fn save_event(&self, event: &ForwardingEvent) -> Result<(), StoreError>;

    async fn find_event_by_sent_id(
        &self,
        sent_email_id: &str,
    ) -> Result<Option<ForwardingEvent>, StoreError>;

    /// Events for an inbound message, oldest first.
    async fn find_events_by_received_id(
        &self,
        received_email_id: &str,
    ) -> Result<Vec<ForwardingEvent>, StoreError>;

    /// Delete events created strictly before `cutoff`; returns how many.
    async fn delete_events_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    // ── Audit log ───────────────────────────────────────────────────

    async fn append_log(&self, entry: NewEventLog) -> Result<EventLog, StoreError>;

    /// Audit entries matching `filter`, oldest first.
    async fn list_logs(&self, filter: &LogFilter) -> Result<Vec<EventLog>, StoreError>;
}

/// Generate a random lowercase alphanumeric record id.
pub fn new_record_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RECORD_ID_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}
