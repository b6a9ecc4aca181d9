// ── Webhook dispatch ──
//
// Turns raw HTTP deliveries into lifecycle manager calls. Nothing that
// goes wrong while handling a delivery leaks to the caller: errors and
// panics alike become a bare 500.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::WEBHOOK_ROUTE_PREFIX;
use crate::smartapp::{LifecycleError, LifecycleRequest, SmartAppManager};

/// Transport-level outcome of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    /// JSON body; absent on failure.
    pub body: Option<Value>,
}

impl WebhookResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    fn internal_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: None,
        }
    }
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, axum::Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Handle one delivery against `manager`.
pub async fn handle_inbound(
    manager: &SmartAppManager,
    raw_body: &[u8],
    headers: &HeaderMap,
) -> WebhookResponse {
    let handling = async {
        let request: LifecycleRequest = serde_json::from_slice(raw_body)?;
        debug!(lifecycle = ?request.lifecycle, "received smartapp webhook");
        let response = manager.handle_request(request, headers).await?;
        Ok::<_, LifecycleError>(serde_json::to_value(response)?)
    };

    match AssertUnwindSafe(handling).catch_unwind().await {
        Ok(Ok(body)) => WebhookResponse::ok(body),
        Ok(Err(e)) => {
            error!(error = %e, "error processing webhook");
            WebhookResponse::internal_error()
        }
        Err(_) => {
            error!("panic while processing webhook");
            WebhookResponse::internal_error()
        }
    }
}

// ── Registry + routing ───────────────────────────────────────────────

/// Maps webhook ids to the manager serving them.
#[derive(Default)]
pub struct WebhookRegistry {
    endpoints: DashMap<String, Arc<SmartAppManager>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, webhook_id: impl Into<String>, manager: Arc<SmartAppManager>) {
        let webhook_id = webhook_id.into();
        debug!(%webhook_id, "registered webhook endpoint");
        self.endpoints.insert(webhook_id, manager);
    }

    pub fn get(&self, webhook_id: &str) -> Option<Arc<SmartAppManager>> {
        self.endpoints.get(webhook_id).map(|m| Arc::clone(m.value()))
    }

    pub fn contains(&self, webhook_id: &str) -> bool {
        self.endpoints.contains_key(webhook_id)
    }
}

/// `POST /api/webhook/:webhook_id`.
pub fn router(registry: Arc<WebhookRegistry>) -> Router {
    let route = format!("{WEBHOOK_ROUTE_PREFIX}:webhook_id");
    Router::new()
        .route(&route, post(receive))
        .with_state(registry)
}

async fn receive(
    State(registry): State<Arc<WebhookRegistry>>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(manager) = registry.get(&webhook_id) else {
        debug!(%webhook_id, "delivery for unknown webhook");
        return StatusCode::NOT_FOUND.into_response();
    };
    handle_inbound(&manager, &body, &headers).await.into_response()
}
