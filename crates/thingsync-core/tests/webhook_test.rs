#![allow(clippy::unwrap_used)]
// Webhook route and dispatcher behaviour, driven through the axum router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thingsync_core::smartapp::LifecycleRequest;
use thingsync_core::webhook::{handle_inbound, router};
use thingsync_core::{
    AcceptUnsigned, InstalledAppContext, LifecycleError, LifecycleNotice, SignatureVerifier,
    SmartApp, SmartAppManager, WebhookRegistry,
};

const TARGET_URL: &str = "https://hub.example.net/api/webhook/hook-1";

// ── Helpers ─────────────────────────────────────────────────────────

fn manager_with(verifier: Arc<dyn SignatureVerifier>) -> Arc<SmartAppManager> {
    let manager = SmartAppManager::new(TARGET_URL, reqwest::Client::new(), verifier);
    manager.register_app(SmartApp::new("app-1", "thingsync", "bridge"));
    manager.attach_installation(InstalledAppContext {
        entry_id: "entry-1".into(),
        installed_app_id: "ia-1".into(),
        location_id: "loc-1".into(),
        app_id: "app-1".into(),
    });
    Arc::new(manager)
}

fn manager() -> Arc<SmartAppManager> {
    manager_with(Arc::new(AcceptUnsigned))
}

fn registry(manager: &Arc<SmartAppManager>) -> Arc<WebhookRegistry> {
    let registry = WebhookRegistry::new();
    registry.register("hook-1", Arc::clone(manager));
    Arc::new(registry)
}

async fn post(registry: Arc<WebhookRegistry>, uri: &str, body: String) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router(registry).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn post_json(registry: Arc<WebhookRegistry>, body: &Value) -> (StatusCode, Value) {
    let (status, bytes) = post(registry, "/api/webhook/hook-1", body.to_string()).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

// ── Routing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_is_answered_with_challenge() {
    let manager = manager();
    let (status, body) = post_json(
        registry(&manager),
        &json!({ "lifecycle": "PING", "pingData": { "challenge": "abc" } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "pingData": { "challenge": "abc" } }));
}

#[tokio::test]
async fn test_unknown_webhook_id_is_not_found() {
    let manager = manager();
    let (status, _) = post(
        registry(&manager),
        "/api/webhook/nope",
        json!({ "lifecycle": "PING", "pingData": { "challenge": "abc" } }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Failure mapping ─────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_body_is_internal_error_with_empty_body() {
    let manager = manager();
    let (status, bytes) = post(registry(&manager), "/api/webhook/hook-1", "{not json".into()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_unregistered_app_is_internal_error() {
    let manager = manager();
    let (status, body) = post_json(
        registry(&manager),
        &json!({ "lifecycle": "OAUTH_CALLBACK", "appId": "someone-else" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, Value::Null);
}

struct PanickingVerifier;

impl SignatureVerifier for PanickingVerifier {
    fn verify(&self, _: &LifecycleRequest, _: &HeaderMap) -> Result<(), LifecycleError> {
        panic!("verifier exploded");
    }
}

#[tokio::test]
async fn test_panic_during_handling_is_internal_error() {
    let manager = manager_with(Arc::new(PanickingVerifier));
    let body = json!({ "lifecycle": "OAUTH_CALLBACK", "appId": "app-1" }).to_string();

    let response = handle_inbound(&manager, body.as_bytes(), &HeaderMap::new()).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body.is_none());
}

#[tokio::test]
async fn test_rejected_signature_is_internal_error() {
    struct RejectAll;
    impl SignatureVerifier for RejectAll {
        fn verify(&self, _: &LifecycleRequest, _: &HeaderMap) -> Result<(), LifecycleError> {
            Err(LifecycleError::Signature("missing authorization header".into()))
        }
    }

    let manager = manager_with(Arc::new(RejectAll));
    let body = json!({ "lifecycle": "OAUTH_CALLBACK", "appId": "app-1" }).to_string();

    let response = handle_inbound(&manager, body.as_bytes(), &HeaderMap::new()).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ── Lifecycles ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_confirmation_fetches_url_and_returns_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/confirm"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager();
    let (status, body) = post_json(
        registry(&manager),
        &json!({
            "lifecycle": "CONFIRMATION",
            "confirmationData": {
                "appId": "app-1",
                "confirmationUrl": format!("{}/confirm", server.uri())
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "targetUrl": TARGET_URL }));
}

#[tokio::test]
async fn test_device_lifecycle_event_notifies_devices_changed() {
    let manager = manager();
    let mut notices = manager.subscribe();

    let (status, body) = post_json(
        registry(&manager),
        &json!({
            "lifecycle": "EVENT",
            "appId": "app-1",
            "eventData": {
                "authToken": "tok",
                "installedApp": { "installedAppId": "ia-1", "locationId": "loc-1" },
                "events": [{
                    "eventType": "DEVICE_LIFECYCLE_EVENT",
                    "deviceLifecycleEvent": { "lifecycle": "CREATE", "deviceId": "d9" }
                }]
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "eventData": {} }));
    match notices.try_recv().unwrap() {
        LifecycleNotice::DevicesChanged { context } => assert_eq!(context.entry_id, "entry-1"),
        other => panic!("unexpected notice {other:?}"),
    }
}

#[tokio::test]
async fn test_events_for_unknown_installation_are_ignored() {
    let manager = manager();
    let mut notices = manager.subscribe();

    let (status, _) = post_json(
        registry(&manager),
        &json!({
            "lifecycle": "EVENT",
            "appId": "app-1",
            "eventData": {
                "installedApp": { "installedAppId": "ia-unknown", "locationId": "loc-1" },
                "events": [{
                    "eventType": "DEVICE_EVENT",
                    "deviceEvent": {
                        "deviceId": "d1",
                        "capability": "switch",
                        "attribute": "switch",
                        "value": "off"
                    }
                }]
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(notices.try_recv().is_err());
}
