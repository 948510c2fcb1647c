//! HTTP handlers.
//!
//! The webhook handler hands the raw body to the pipeline untouched; the
//! signature covers the exact bytes the provider sent.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::pipeline::Forwarder;

pub const WEBHOOK_PATH: &str = "/api/webhooks/resend";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new(forwarder: Forwarder) -> Self {
        Self {
            forwarder: Arc::new(forwarder),
        }
    }
}

/// Routes served by the web binary.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(resend_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Resend Webhook
// =============================================================================

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Resend webhook endpoint.
///
/// 200 with an empty body on success or a benign no-op, otherwise the
/// pipeline's status with `{"error": ...}`.
pub async fn resend_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = state.forwarder.handle(&body, &headers).await;

    match outcome.error {
        None if outcome.status == StatusCode::OK => StatusCode::OK.into_response(),
        error => {
            let error = error.unwrap_or_else(|| "request failed".to_string());
            (outcome.status, Json(ErrorResponse { error })).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::provider::fake::FakeProvider;
    use crate::store::MemoryStore;
    use crate::vault::SecretVault;

    fn app() -> Router {
        let forwarder = Forwarder::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeProvider::new()),
            Arc::new(SecretVault::new("0123456789abcdef0123456789abcdef").unwrap()),
            300,
        );
        build_router(AppState::new(forwarder))
    }

    async fn post(body: &'static str) -> (StatusCode, Vec<u8>) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(WEBHOOK_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_unknown_type_returns_empty_ok() {
        let (status, body) = post(r#"{"type":"contact.created","data":{}}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_returns_json_error() {
        let (status, body) = post("{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().starts_with("invalid payload"));
    }

    #[tokio::test]
    async fn test_unknown_alias_returns_not_found() {
        let (status, body) = post(
            r#"{"type":"email.received","data":{"email_id":"in_1","to":["nobody@x.com"]}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "forwarding rule not found");
    }

    #[tokio::test]
    async fn test_lifecycle_for_unknown_message_is_ok() {
        let (status, body) =
            post(r#"{"type":"email.delivered","data":{"email_id":"out_9","to":["me@y.com"]}}"#)
                .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }
}
