//! HTTP surface: the Resend webhook endpoint and a health check.

pub mod handlers;
pub mod payload;
pub mod signature;

pub use handlers::{build_router, health, resend_webhook, AppState, HealthResponse, WEBHOOK_PATH};
pub use payload::WebhookEvent;
pub use signature::{SignatureError, WebhookVerifier};
