//! Retention sweep for old forwarding events.
//!
//! Only forwarding events are purged. Audit entries are append-only and are
//! never deleted here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Zero, or so large the cutoff falls outside the representable range
    #[error("unusable retention window of {0} days")]
    InvalidWindow(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Instant before which events are expired, if `retention_days` is usable.
fn cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    if retention_days == 0 {
        return None;
    }
    let window = chrono::Duration::try_days(i64::from(retention_days))?;
    now.checked_sub_signed(window)
}

/// Delete forwarding events created more than `retention_days` before `now`.
pub async fn purge_expired(
    store: &dyn RecordStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<usize, RetentionError> {
    let cutoff =
        cutoff(now, retention_days).ok_or(RetentionError::InvalidWindow(retention_days))?;
    let deleted = store.delete_events_created_before(cutoff).await?;

    info!(
        retention_days = retention_days,
        cutoff = %cutoff,
        deleted = deleted,
        "retention_sweep_completed"
    );

    Ok(deleted)
}

/// Run [`purge_expired`] every `interval` until the task is dropped.
pub async fn run_sweeper(store: Arc<dyn RecordStore>, retention_days: u32, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        if let Err(e) = purge_expired(store.as_ref(), retention_days, Utc::now()).await {
            error!(error = %e, "retention_sweep_failed");
        }
    }
}
