//! Audit Logger: append-only trail of notable forwarding occurrences.
//!
//! Writes are best-effort. A failed write is reported on the operational log
//! and never changes the outcome of the pipeline that produced it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::model::{AuditEventType, NewEventLog};
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn RecordStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn log(
        &self,
        owner: &str,
        rule: &str,
        event: Option<&str>,
        kind: AuditEventType,
        metadata: Value,
    ) {
        let entry = NewEventLog {
            owner: owner.to_string(),
            rule: rule.to_string(),
            event: event.map(str::to_string),
            kind,
            metadata,
        };

        match self.store.append_log(entry).await {
            Ok(record) => debug!(
                log_id = %record.id,
                event_type = kind.as_str(),
                forwarding_event_id = ?event,
                "audit_entry_written"
            ),
            Err(e) => error!(
                error = %e,
                event_type = kind.as_str(),
                owner = %owner,
                rule_id = %rule,
                forwarding_event_id = ?event,
                "audit_entry_write_failed"
            ),
        }
    }
}
