// ABOUTME: HTTP server for WhatsApp webhooks, health checks and Prometheus metrics.
// ABOUTME: Acknowledges deliveries immediately and hands messages to the orchestrator in the background.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use jarvis_core::config::ServerConfig;
use jarvis_core::Orchestrator;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::whatsapp::{parse_webhook_message, WhatsAppClient};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Clone)]
pub struct WebhookState {
    pub orchestrator: Arc<Orchestrator>,
    pub whatsapp: Arc<WhatsAppClient>,
}

/// All routes; `/metrics` is only mounted when a recorder was installed
pub fn router(state: WebhookState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let webhook_routes = Router::new()
        .route("/webhook", get(verify_handler).post(receive_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state));

    let mut app = webhook_routes;
    if let Some(handle) = metrics_handle {
        let metrics_routes = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(Arc::new(handle));
        app = app.merge(metrics_routes);
    }

    app.layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn start_webhook_server(
    config: &ServerConfig,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Starting webhook server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Webhook server failed")?;
    Ok(())
}

/// Meta subscription handshake
async fn verify_handler(
    State(state): State<Arc<WebhookState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let param = |key: &str| params.get(key).map(String::as_str).filter(|v| !v.is_empty());
    let (Some(mode), Some(token), Some(challenge)) = (
        param("hub.mode"),
        param("hub.verify_token"),
        param("hub.challenge"),
    ) else {
        return (StatusCode::BAD_REQUEST, "Missing parameters").into_response();
    };

    match state.whatsapp.verify_webhook(mode, token, challenge) {
        Some(challenge) => {
            tracing::info!("Webhook verified successfully");
            challenge.into_response()
        }
        None => {
            tracing::warn!(mode = %mode, "Webhook verification failed");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        }
    }
}

async fn receive_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.whatsapp.verify_signature(&body, signature) {
        tracing::warn!("Invalid webhook signature");
        return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook body is not valid JSON");
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    // Status callbacks and other non-message events are acknowledged and dropped
    let Some(message) = parse_webhook_message(&payload) else {
        return Json(json!({ "status": "ok" })).into_response();
    };

    tracing::info!(
        sender = %message.sender_id,
        name = message.sender_name.as_deref().unwrap_or(""),
        kind = message.kind.as_str(),
        message_id = message.id.as_deref().unwrap_or(""),
        reply_to = message.quoted_id.as_deref().unwrap_or(""),
        "Received WhatsApp message"
    );

    state.orchestrator.spawn_handle(message);

    Json(json!({ "status": "ok" })).into_response()
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "jarvis" }))
}

async fn metrics_handler(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
