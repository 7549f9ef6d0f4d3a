//! Integration tests for the gate HTTP server
//!
//! Tests verify:
//! - Gate page rendering and session creation
//! - Immediate redirect when a recent decision exists
//! - Signal relay and session view polling
//! - Error responses for unknown sessions and signal kinds
//! - Idle session eviction
//! - Store reads that do not hold up other requests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use musicgate::models::{DecisionRecord, GateConfig};
use musicgate::server::router;
use musicgate::store::{
    load_record, save_record, KeyValueStore, MemoryStore, RecordKeys, StoreResult,
};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

fn app(store: &MemoryStore) -> Router {
    let store: Arc<dyn KeyValueStore> = Arc::new(store.clone());
    router(GateConfig::default(), store)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

async fn open_gate(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_string(response).await;
    let marker = "data-session=\"";
    let start = html.find(marker).expect("session id in page") + marker.len();
    html[start..start + 36].to_string()
}

async fn post_signal(
    app: &Router,
    session: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::post(format!("/api/sessions/{}/signals", session))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_view(app: &Router, session: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::get(format!("/api/sessions/{}", session))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_gate_page_served_without_prior_decision() {
    let store = MemoryStore::new();
    let app = app(&store);

    let session = open_gate(&app).await;

    assert_eq!(session.len(), 36);
    let view = body_json(get_view(&app, &session).await).await;
    assert_eq!(view["transitioned"], false);
    assert_eq!(view["redirect"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_recent_decision_redirects_immediately() {
    let store = MemoryStore::new();
    let now = Utc::now().timestamp_millis();
    save_record(
        &store,
        &RecordKeys::default(),
        &DecisionRecord::started_at(now - 30 * 60 * 1000),
    )
    .unwrap();

    let response = app(&store)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "main.html"
    );
}

#[tokio::test]
async fn test_expired_decision_shows_gate() {
    let store = MemoryStore::new();
    let now = Utc::now().timestamp_millis();
    save_record(
        &store,
        &RecordKeys::default(),
        &DecisionRecord::started_at(now - 90 * 60 * 1000),
    )
    .unwrap();

    let session = open_gate(&app(&store)).await;
    assert_eq!(session.len(), 36);
}

#[tokio::test]
async fn test_unknown_signal_kind_rejected() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    let response = post_signal(&app, &session, serde_json::json!({ "kind": "scroll" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_session_not_found() {
    let store = MemoryStore::new();
    let app = app(&store);
    let missing = uuid::Uuid::new_v4().to_string();

    let response = post_signal(&app, &missing, serde_json::json!({ "kind": "click" })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get_view(&app, &missing).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_assets_served() {
    let store = MemoryStore::new();
    let app = app(&store);

    for (path, content_type) in [
        ("/static/gate.js", "application/javascript"),
        ("/static/gate.css", "text/css"),
    ] {
        let response = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            content_type
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_manual_signal_transitions_and_redirects() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    let response = post_signal(&app, &session, serde_json::json!({ "kind": "manual" })).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["accepted"], true);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let view = body_json(get_view(&app, &session).await).await;
    assert_eq!(view["transitioned"], true);
    assert_eq!(view["redirect"], serde_json::Value::Null);

    let record = load_record(&store, &RecordKeys::default(), i64::MAX).unwrap();
    assert!(record.started);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = body_json(get_view(&app, &session).await).await;
    assert_eq!(view["redirect"], "main.html");

    // Session is dropped once the redirect has been handed out
    let response = get_view(&app, &session).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_click_then_confirmation_delay() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    let response = post_signal(&app, &session, serde_json::json!({ "kind": "click" })).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let view = body_json(get_view(&app, &session).await).await;
    assert_eq!(view["loading_visible"], true);
    assert_eq!(view["transitioned"], false);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let view = body_json(get_view(&app, &session).await).await;
    assert_eq!(view["transitioned"], true);
}

#[tokio::test(start_paused = true)]
async fn test_override_stays_hidden_after_late_transition() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    // Confirmation lands at 8.5s, before the override reveal at 10s
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    post_signal(&app, &session, serde_json::json!({ "kind": "click" })).await;

    tokio::time::sleep(Duration::from_millis(4_700)).await;
    let view = body_json(get_view(&app, &session).await).await;
    assert_eq!(view["transitioned"], true);
    assert_eq!(view["override_visible"], false);
    assert_eq!(view["redirect"], serde_json::Value::Null);
}

#[tokio::test(start_paused = true)]
async fn test_unpolled_session_is_evicted() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;

    let response = get_view(&app, &session).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_transitioned_session_without_poll_is_evicted() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    post_signal(&app, &session, serde_json::json!({ "kind": "manual" })).await;
    tokio::time::sleep(Duration::from_secs(301)).await;

    let response = get_view(&app, &session).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(load_record(&store, &RecordKeys::default(), i64::MAX).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_polled_session_outlives_idle_window() {
    let store = MemoryStore::new();
    let app = app(&store);
    let session = open_gate(&app).await;

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let response = get_view(&app, &session).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = post_signal(&app, &session, serde_json::json!({ "kind": "focus" })).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

/// Store whose first read blocks until released
struct GatedStore {
    inner: MemoryStore,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl KeyValueStore for GatedStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_store_read_does_not_block_other_requests() {
    let (release, gate) = mpsc::channel();
    let store: Arc<dyn KeyValueStore> = Arc::new(GatedStore {
        inner: MemoryStore::new(),
        gate: Mutex::new(Some(gate)),
    });
    let app = router(GateConfig::default(), store);

    let first = tokio::spawn({
        let app = app.clone();
        async move {
            app.oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap()
                .status()
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let missing = uuid::Uuid::new_v4().to_string();
    let response = tokio::time::timeout(Duration::from_secs(2), get_view(&app, &missing))
        .await
        .expect("session lookup waited on the store read");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    release.send(()).unwrap();
    assert_eq!(first.await.unwrap(), StatusCode::OK);
}
