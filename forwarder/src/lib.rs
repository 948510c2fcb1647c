//! ResendForward - webhook-driven email forwarding for Resend inbound mail.
//!
//! An inbound message addressed to a user's alias arrives as an
//! `email.received` webhook. The forwarder resolves the alias to a rule,
//! authenticates the webhook with the owner's signing secret, fetches the
//! message body and attachments, and sends a copy to the rule's destination.
//! Later `email.sent` / `email.delivered` / `email.failed` webhooks advance
//! the recorded forwarding event.
//!
//! ## Architecture
//!
//! ```text
//! Resend ─► web ─► pipeline ─┬─► rules / vault / signature
//!                            ├─► fetch ─► provider
//!                            ├─► dispatch ─► provider
//!                            └─► lifecycle / audit ─► store
//! ```

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod retention;
pub mod rules;
pub mod store;
pub mod vault;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{FailureReason, ForwardError};
pub use model::{EventStatus, ForwardingEvent, ForwardingRule};
pub use pipeline::{Forwarder, Outcome};
pub use provider::{EmailProvider, ResendClient};
pub use store::{MemoryStore, RecordStore};
pub use vault::SecretVault;
pub use web::AppState;
