// =============================================================================
// Central Application State — Deriv Pulse
// =============================================================================
//
// Owns the active ConnectionManager and the runtime config, and provides a
// unified snapshot for the REST API and WebSocket push feed.
//
// Exactly one manager is live at a time. Changing the symbol or timeframe
// disposes the current manager before the replacement is opened, so two
// gateway sessions never run side by side.
//
// Every feed event is forwarded to `events` (for WebSocket clients) and bumps
// `state_version`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::feed::{ConnectionManager, FeedEvent, FeedSnapshot};
use crate::gateway::Connector;
use crate::indicators::LatestIndicators;
use crate::runtime_config::RuntimeConfig;
use crate::types::{ConnectionStatus, Timeframe};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded feed error for the error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub symbol: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Serializable view served by `GET /api/v1/feed` and pushed over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub feed: FeedSnapshot,
    pub indicators: LatestIndicators,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct AppState {
    /// Monotonically increasing; bumped on every forwarded feed event.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    connector: Arc<dyn Connector>,
    feed: RwLock<Arc<ConnectionManager>>,
    /// Held across start, shutdown and every subscription switch so the live
    /// manager, its forwarder and the config always change together.
    switch_lock: Mutex<()>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<FeedEvent>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Bearer token required by control endpoints; `None` rejects them all.
    admin_token: Option<String>,

    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the state and its first (not yet opened) manager.
    pub fn new(config: RuntimeConfig, connector: Arc<dyn Connector>) -> Self {
        let manager = ConnectionManager::new(
            config.subscription_context(),
            config.feed_settings(),
            connector.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            connector,
            feed: RwLock::new(Arc::new(manager)),
            switch_lock: Mutex::new(()),
            forwarder: Mutex::new(None),
            events,
            recent_errors: RwLock::new(Vec::new()),
            admin_token: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    /// Open the current manager and start forwarding its events.
    pub fn start(self: &Arc<Self>) {
        let _switching = self.switch_lock.lock();
        let manager = self.feed();
        self.attach(&manager);
        manager.open();
    }

    /// Dispose the current manager and stop forwarding.
    pub fn shutdown(&self) {
        let _switching = self.switch_lock.lock();
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
        self.feed().dispose();
    }

    /// The live manager.
    pub fn feed(&self) -> Arc<ConnectionManager> {
        self.feed.read().clone()
    }

    /// Feed events from whichever manager is live, across switches.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Replace the subscription. `None` keeps the current value. The old
    /// manager is disposed before the new one opens.
    pub fn switch_subscription(
        self: &Arc<Self>,
        symbol: Option<String>,
        timeframe: Option<Timeframe>,
    ) -> Arc<ConnectionManager> {
        let _switching = self.switch_lock.lock();

        let (context, settings) = {
            let mut config = self.runtime_config.write();
            if let Some(symbol) = symbol {
                config.symbol = symbol;
            }
            if let Some(timeframe) = timeframe {
                config.timeframe = timeframe;
            }
            (config.subscription_context(), config.feed_settings())
        };

        let replacement = Arc::new(ConnectionManager::new(
            context,
            settings,
            self.connector.clone(),
        ));

        let previous = {
            let mut feed = self.feed.write();
            std::mem::replace(&mut *feed, replacement.clone())
        };
        previous.dispose();

        info!(
            from = %previous.context().symbol,
            to = %replacement.context().symbol,
            granularity = replacement.context().granularity_seconds,
            "switching feed subscription"
        );

        self.attach(&replacement);
        replacement.open();
        self.increment_version();
        replacement
    }

    fn attach(self: &Arc<Self>, manager: &ConnectionManager) {
        let mut rx = manager.subscribe();
        let symbol = manager.context().symbol.clone();
        let weak: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "feed event forwarder lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(state) = weak.upgrade() else { break };
                state.on_feed_event(&symbol, event);
            }
        });

        if let Some(previous) = self.forwarder.lock().replace(task) {
            previous.abort();
        }
    }

    fn on_feed_event(&self, symbol: &str, event: FeedEvent) {
        if let FeedEvent::StatusChanged {
            status: ConnectionStatus::Error,
            error: Some(message),
        } = &event
        {
            self.push_error(symbol, message.clone());
        }
        self.increment_version();
        // No WebSocket clients is fine.
        let _ = self.events.send(event);
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. Capped at [`MAX_RECENT_ERRORS`]; oldest
    /// entries are evicted first.
    pub fn push_error(&self, symbol: &str, message: String) {
        let record = ErrorRecord {
            message,
            symbol: symbol.to_string(),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn build_snapshot(&self) -> StateSnapshot {
        let manager = self.feed();
        let params = self.runtime_config.read().indicators.clone();

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            feed: manager.snapshot(),
            indicators: manager.indicators(&params).latest(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::transport::testing::StalledConnector;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            RuntimeConfig::default(),
            Arc::new(StalledConnector),
        ))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_opens_configured_subscription() {
        let state = state();
        state.start();
        settle().await;

        let feed = state.feed();
        assert_eq!(feed.open_count(), 1);
        assert_eq!(feed.context().symbol, "R_25");
        assert_eq!(feed.context().granularity_seconds, 60);
        assert_eq!(feed.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_disposes_previous_manager() {
        let state = state();
        state.start();
        settle().await;
        let old = state.feed();

        let new = state.switch_subscription(Some("frxEURUSD".into()), Some(Timeframe::H4));
        settle().await;

        assert_eq!(old.status(), ConnectionStatus::Disconnected);
        assert_eq!(new.context().symbol, "frxEURUSD");
        assert_eq!(new.context().granularity_seconds, 14_400);
        assert_eq!(new.open_count(), 1);
        assert!(Arc::ptr_eq(&new, &state.feed()));

        let config = state.runtime_config.read();
        assert_eq!(config.symbol, "frxEURUSD");
        assert_eq!(config.timeframe, Timeframe::H4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_switches_leave_one_live_manager() {
        use std::time::Duration;
        use tokio::sync::Barrier;

        const SWITCHERS: usize = 8;

        for _ in 0..25 {
            let state = state();
            state.start();
            let initial = state.feed();
            let barrier = Arc::new(Barrier::new(SWITCHERS));

            let tasks: Vec<_> = (0..SWITCHERS)
                .map(|i| {
                    let state = state.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        state.switch_subscription(Some(format!("SYM{i}")), None)
                    })
                })
                .collect();

            let mut managers = vec![initial];
            for task in tasks {
                managers.push(task.await.unwrap());
            }

            let live: Vec<_> = managers
                .iter()
                .filter(|m| m.status() != ConnectionStatus::Disconnected)
                .collect();
            assert_eq!(live.len(), 1);
            assert!(Arc::ptr_eq(live[0], &state.feed()));
            assert_eq!(
                state.runtime_config.read().symbol,
                state.feed().context().symbol
            );

            // Let aborted forwarders wind down, then check the live one is wired up.
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut rx = state.subscribe();
            state.feed().dispose();
            let forwarded = tokio::time::timeout(Duration::from_secs(1), async {
                loop {
                    if let Ok(FeedEvent::StatusChanged {
                        status: ConnectionStatus::Disconnected,
                        ..
                    }) = rx.recv().await
                    {
                        break;
                    }
                }
            })
            .await;
            assert!(forwarded.is_ok(), "live manager events are not forwarded");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn switch_keeps_unspecified_fields() {
        let state = state();
        state.start();
        let new = state.switch_subscription(None, Some(Timeframe::M5));
        assert_eq!(new.context().symbol, "R_25");
        assert_eq!(new.context().granularity_seconds, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn forwarded_events_bump_version() {
        let state = state();
        let mut rx = state.subscribe();
        state.start();
        settle().await;
        let before = state.current_state_version();

        state.shutdown();
        state.on_feed_event(
            "R_25",
            FeedEvent::StatusChanged {
                status: ConnectionStatus::Error,
                error: Some("boom".into()),
            },
        );

        assert!(state.current_state_version() > before);
        assert_eq!(state.recent_errors.read().len(), 1);
        assert_eq!(state.recent_errors.read()[0].message, "boom");
        assert!(matches!(rx.try_recv(), Ok(FeedEvent::StatusChanged { .. })));
    }

    #[test]
    fn error_log_is_capped() {
        let state = AppState::new(RuntimeConfig::default(), Arc::new(StalledConnector));
        for i in 0..(MAX_RECENT_ERRORS + 5) {
            state.push_error("R_25", format!("e{i}"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "e5");
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_feed_and_indicators() {
        let state = state();
        let snap = state.build_snapshot();
        assert_eq!(snap.feed.symbol, "R_25");
        assert!(snap.feed.candles.is_empty());
        assert_eq!(snap.indicators.rsi, None);
    }
}
