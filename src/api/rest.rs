// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Read endpoints are public; control
// endpoints (reconnect, subscription switch) require a valid Bearer token
// checked via the `AuthBearer` extractor.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::markets::{self, Market, MarketKind};
use crate::types::{ConnectionStatus, Timeframe};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/feed", get(feed_snapshot))
        .route("/api/v1/candles", get(candles))
        .route("/api/v1/indicators", get(indicators))
        .route("/api/v1/markets", get(market_catalogue))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/feed/reconnect", post(reconnect))
        .route("/api/v1/feed/subscription", post(switch_subscription))
        // ── WebSocket ───────────────────────────────────────────────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    feed_status: ConnectionStatus,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        feed_status: state.feed().status(),
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };
    Json(resp)
}

// =============================================================================
// Feed data
// =============================================================================

async fn feed_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn candles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let feed = state.feed();
    let ctx = feed.context();
    Json(serde_json::json!({
        "symbol": ctx.symbol,
        "granularity_seconds": ctx.granularity_seconds,
        "candles": feed.candles(),
    }))
}

async fn indicators(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let params = state.runtime_config.read().indicators.clone();
    let series = state.feed().indicators(&params);
    Json(serde_json::json!({
        "params": params,
        "latest": series.latest(),
        "series": series,
    }))
}

#[derive(Deserialize)]
struct MarketQuery {
    #[serde(default)]
    kind: Option<MarketKind>,
}

async fn market_catalogue(Query(query): Query<MarketQuery>) -> impl IntoResponse {
    let list: Vec<&Market> = match query.kind {
        Some(kind) => markets::by_kind(kind).collect(),
        None => markets::MARKETS.iter().collect(),
    };
    Json(list)
}

// =============================================================================
// Control (authenticated)
// =============================================================================

async fn reconnect(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let feed = state.feed();
    feed.reconnect();
    Json(serde_json::json!({
        "symbol": feed.context().symbol,
        "status": feed.status(),
    }))
}

#[derive(Deserialize)]
struct SubscriptionUpdate {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    timeframe: Option<Timeframe>,
}

async fn switch_subscription(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(update): Json<SubscriptionUpdate>,
) -> impl IntoResponse {
    let symbol = update.symbol.map(|s| s.trim().to_string());
    if symbol.as_deref() == Some("") {
        let body = serde_json::json!({ "error": "symbol must not be empty" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    if let Some(sym) = symbol.as_deref() {
        if markets::find(sym).is_none() {
            warn!(symbol = %sym, "switching to a symbol outside the market catalogue");
        }
    }

    let feed = state.switch_subscription(symbol, update.timeframe);
    let ctx = feed.context();
    info!(symbol = %ctx.symbol, granularity = ctx.granularity_seconds, "subscription switched via API");

    Json(serde_json::json!({
        "symbol": ctx.symbol,
        "granularity_seconds": ctx.granularity_seconds,
        "status": feed.status(),
    }))
    .into_response()
}

// =============================================================================
// Tests
// =============================================================================
