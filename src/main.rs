// =============================================================================
// Deriv Pulse — Main Entry Point
// =============================================================================
//
// Streams candles and ticks for one Deriv symbol, keeps the indicator
// pipeline current, and serves the result over REST and WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod feed;
mod gateway;
mod indicators;
mod market_data;
mod markets;
mod runtime_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::feed::FeedEvent;
use crate::gateway::WsConnector;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "feed_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Deriv Pulse starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();

    info!(
        symbol = %config.symbol,
        timeframe = %config.timeframe,
        endpoint = %config.endpoint(),
        authorized = config.auth_token.is_some(),
        "Feed configured"
    );

    let admin_token = std::env::var("PULSE_ADMIN_TOKEN").ok();
    if admin_token.as_deref().map_or(true, str::is_empty) {
        warn!("PULSE_ADMIN_TOKEN is not set; control endpoints are disabled");
    }
    let bind_addr = config.bind_addr.clone();

    // ── 2. Shared state & feed ───────────────────────────────────────────
    let state = Arc::new(
        AppState::new(config, Arc::new(WsConnector)).with_admin_token(admin_token),
    );
    state.start();

    // ── 3. Feed event log ────────────────────────────────────────────────
    let mut events = state.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(FeedEvent::StatusChanged { status, error }) => {
                    info!(status = %status, error = ?error, "Feed status changed");
                }
                Ok(FeedEvent::BalanceChanged { balance }) => {
                    info!(balance, "Account balance updated");
                }
                Ok(FeedEvent::CandlesChanged { len, last }) => {
                    debug!(len, close = ?last.map(|c| c.close), "Candles updated");
                }
                Ok(FeedEvent::TickChanged { tick, direction }) => {
                    debug!(price = tick.price, direction = %direction, "Tick");
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ── 4. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    state.shutdown();

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Deriv Pulse shut down complete.");
    Ok(())
}
