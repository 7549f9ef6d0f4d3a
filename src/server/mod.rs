//! Gate HTTP server
//!
//! Serves the gate page and relays browser events to a per-page-load
//! [`GateSession`]. The page polls its session view to toggle visuals and
//! follow the redirect once the gate transitions.
//!
//! A session that sees neither a signal nor a poll for
//! `server.session_idle_secs` is evicted. Eviction detaches its sources, so
//! the session task finishes once its remaining timers have fired.

mod view;

pub use view::{GateView, SharedView};

use crate::clock::TokioClock;
use crate::models::{GateConfig, Signal};
use crate::session::{
    Capability, GateSession, SignalSource, SourceRoutes, Started, UnavailableSource,
};
use crate::store::KeyValueStore;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const GATE_TEMPLATE: &str = include_str!("assets/gate.html");

/// A live gate session as seen by the HTTP handlers
struct SessionEntry {
    routes: SourceRoutes,
    view: SharedView,
    last_seen: Instant,
}

/// Application state shared across handlers
struct AppState {
    config: Arc<GateConfig>,
    store: Arc<dyn KeyValueStore>,
    sessions: HashMap<Uuid, SessionEntry>,
}

impl AppState {
    /// Drop sessions idle for longer than the configured window
    fn evict_idle(&mut self, now: Instant) {
        let idle = self.config.server.session_idle();
        self.sessions.retain(|id, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) < idle;
            if !keep {
                entry.routes.detach_all();
                tracing::debug!(session = %id, "evicting idle gate session");
            }
            keep
        });
    }

    /// Look up a live session and mark it as seen
    fn touch(&mut self, id: &Uuid) -> Option<&mut SessionEntry> {
        let now = Instant::now();
        self.evict_idle(now);
        let entry = self.sessions.get_mut(id)?;
        entry.last_seen = now;
        Some(entry)
    }
}

type SharedState = Arc<tokio::sync::Mutex<AppState>>;

fn shared_state(config: GateConfig, store: Arc<dyn KeyValueStore>) -> SharedState {
    Arc::new(tokio::sync::Mutex::new(AppState {
        config: Arc::new(config),
        store,
        sessions: HashMap::new(),
    }))
}

/// Build the gate router
pub fn router(config: GateConfig, store: Arc<dyn KeyValueStore>) -> Router {
    app(shared_state(config, store))
}

fn app(state: SharedState) -> Router {
    Router::new()
        .route("/", get(serve_gate))
        .route("/static/gate.js", get(serve_gate_js))
        .route("/static/gate.css", get(serve_gate_css))
        .route("/api/sessions/:id", get(api_session_view))
        .route("/api/sessions/:id/signals", post(api_post_signal))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the gate server until Ctrl+C
pub async fn serve(
    config: GateConfig,
    store: Arc<dyn KeyValueStore>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let sweep_every = (config.server.session_idle() / 2).max(Duration::from_secs(1));
    let state = shared_state(config, store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let sweeper = tokio::spawn(sweep_idle_sessions(Arc::clone(&state), sweep_every));

    tracing::info!(%addr, "gate server listening");

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down gate server");
        })
        .await;

    sweeper.abort();
    served?;
    Ok(())
}

/// Evict idle sessions even when no requests arrive
async fn sweep_idle_sessions(state: SharedState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        state.lock().await.evict_idle(Instant::now());
    }
}

// ============================================================================
// Page handlers
// ============================================================================

async fn serve_gate(State(state): State<SharedState>) -> Response {
    let (config, store) = {
        let mut state = state.lock().await;
        state.evict_idle(Instant::now());
        (Arc::clone(&state.config), Arc::clone(&state.store))
    };

    let routes = SourceRoutes::new();
    let view = SharedView::new();
    let session = GateSession::new(&config, TokioClock::anchored_now(), store, view.clone())
        .with_sources(session_sources(&config, &routes));

    // Reading the prior record may hit the disk
    let started = match tokio::task::spawn_blocking(move || session.start()).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(error = %e, "failed to start gate session");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to start gate session" })),
            )
                .into_response();
        }
    };

    match started {
        Started::Skipped { destination } => Redirect::to(&destination).into_response(),
        Started::Armed(armed) => {
            let id = Uuid::new_v4();
            let entry = SessionEntry {
                routes,
                view,
                last_seen: Instant::now(),
            };
            state.lock().await.sessions.insert(id, entry);

            tokio::spawn(async move {
                let outcome = armed.run().await;
                tracing::debug!(session = %id, ?outcome, "gate session ended");
            });
            tracing::debug!(session = %id, "gate session started");

            Html(render_gate_page(&config, id)).into_response()
        }
    }
}

fn session_sources(config: &GateConfig, routes: &SourceRoutes) -> Vec<Box<dyn SignalSource>> {
    let mutation: Box<dyn SignalSource> = if config.detection.observe_player_mutations {
        routes.source(Capability::AttributeMutation)
    } else {
        Box::new(UnavailableSource(Capability::AttributeMutation))
    };

    vec![
        routes.source(Capability::Pointer),
        routes.source(Capability::Focus),
        routes.source(Capability::ManualOverride),
        mutation,
    ]
}

fn render_gate_page(config: &GateConfig, session_id: Uuid) -> String {
    GATE_TEMPLATE
        .replace("{{SESSION_ID}}", &session_id.to_string())
        .replace("{{PLAYER_URL}}", &escape_html(&config.player_url))
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

async fn serve_gate_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("assets/gate.js"),
    )
}

async fn serve_gate_css() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        include_str!("assets/gate.css"),
    )
}

// ============================================================================
// API handlers
// ============================================================================

#[derive(serde::Deserialize)]
struct SignalRequest {
    kind: String,
    #[serde(default)]
    attribute: Option<String>,
}

async fn api_post_signal(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SignalRequest>,
) -> Response {
    let Some(signal) = Signal::from_wire(&req.kind, req.attribute) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("Unknown signal kind: {}", req.kind) })),
        )
            .into_response();
    };

    let mut state = state.lock().await;
    let Some(entry) = state.touch(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Session not found: {}", id) })),
        )
            .into_response();
    };

    tracing::debug!(session = %id, %signal, "signal received");
    let accepted = entry.routes.dispatch(signal);

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": accepted })),
    )
        .into_response()
}

async fn api_session_view(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Response {
    let mut state = state.lock().await;
    let Some(entry) = state.touch(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Session not found: {}", id) })),
        )
            .into_response();
    };

    let view = entry.view.snapshot();
    if view.redirect.is_some() {
        if let Some(entry) = state.sessions.remove(&id) {
            entry.routes.detach_all();
        }
    }

    Json(view).into_response()
}
