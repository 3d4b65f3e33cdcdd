// =============================================================================
// Connection Manager — gateway session lifecycle for one subscription
// =============================================================================
//
//   connecting -> connected -> {error | disconnected} -> connecting (backoff) ...
//
// Each `open()` starts a new *session* (a spawned task that owns the transport)
// and bumps the state generation. A session may only mutate state while its
// generation is current, so frames that arrive after `dispose()` or after a
// newer `open()` are dropped without effect. Inbound frames are handled one at
// a time, each applied fully under the state write lock before the next is
// read.
//
// When the transport closes, the session schedules exactly one reconnect
// timer. `open()`, `reconnect()` and `dispose()` all cancel a pending timer.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, ReconnectPolicy};
use super::state::{FeedEvent, FeedSnapshot, FeedState, CONNECTION_ERROR};
use crate::gateway::codec;
use crate::gateway::{Connection, Connector};
use crate::indicators::{IndicatorParams, IndicatorSeries};
use crate::market_data::candle_series::DEFAULT_CAPACITY;
use crate::market_data::{Candle, Tick};
use crate::types::{ConnectionStatus, PriceDirection};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// What to subscribe to. Fixed for the lifetime of one manager; a different
/// symbol or timeframe means a new manager.
#[derive(Clone, PartialEq, Eq)]
pub struct SubscriptionContext {
    pub symbol: String,
    pub granularity_seconds: u32,
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for SubscriptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionContext")
            .field("symbol", &self.symbol)
            .field("granularity_seconds", &self.granularity_seconds)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Transport-level settings shared by every session of a manager.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub endpoint: String,
    /// History request size and candle series bound.
    pub candle_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl FeedSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            candle_capacity: DEFAULT_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

/// Owns the gateway connection for one [`SubscriptionContext`].
///
/// Dropping the manager disposes it.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    context: SubscriptionContext,
    settings: FeedSettings,
    connector: Arc<dyn Connector>,
    state: RwLock<FeedState>,
    events: broadcast::Sender<FeedEvent>,
    backoff: Mutex<Backoff>,
    // Lock order: session -> reconnect_timer -> state. `backoff` is a leaf and
    // `state` is never held while another lock is taken.
    session: Mutex<Option<JoinHandle<()>>>,
    /// Pending reconnect, tagged with the generation that scheduled it.
    reconnect_timer: Mutex<Option<(u64, JoinHandle<()>)>>,
    opens: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        context: SubscriptionContext,
        settings: FeedSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = FeedState::new(settings.candle_capacity);
        let backoff = Backoff::new(settings.reconnect);
        Self {
            inner: Arc::new(Inner {
                context,
                settings,
                connector,
                state: RwLock::new(state),
                events,
                backoff: Mutex::new(backoff),
                session: Mutex::new(None),
                reconnect_timer: Mutex::new(None),
                opens: AtomicU64::new(0),
            }),
        }
    }

    /// Start (or restart) the connection. Any open transport and any pending
    /// reconnect timer are discarded first. Must be called inside a tokio
    /// runtime.
    pub fn open(&self) {
        self.inner.open();
    }

    /// Operator-triggered reconnect: reopen immediately, bypassing the timer.
    pub fn reconnect(&self) {
        info!(symbol = %self.inner.context.symbol, "manual reconnect requested");
        self.inner.open();
    }

    /// Close the transport and cancel any pending reconnect. Safe to call
    /// repeatedly and from any state.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Receive every state change published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.events.subscribe()
    }

    pub fn context(&self) -> &SubscriptionContext {
        &self.inner.context
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.read().status()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.read().error().map(str::to_string)
    }

    pub fn candles(&self) -> Vec<Candle> {
        self.inner.state.read().candles().to_vec()
    }

    pub fn tick(&self) -> Option<Tick> {
        self.inner.state.read().tick()
    }

    pub fn direction(&self) -> PriceDirection {
        self.inner.state.read().direction()
    }

    pub fn balance(&self) -> Option<f64> {
        self.inner.state.read().balance()
    }

    pub fn subscription_id(&self) -> Option<String> {
        self.inner.state.read().subscription_id().map(str::to_string)
    }

    /// Number of times a session has been started.
    pub fn open_count(&self) -> u64 {
        self.inner.opens.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.read().snapshot(
            &self.inner.context.symbol,
            self.inner.context.granularity_seconds,
        )
    }

    /// Recompute every indicator over the current candle series.
    pub fn indicators(&self, params: &IndicatorParams) -> IndicatorSeries {
        let candles = self.candles();
        IndicatorSeries::compute(&candles, params)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

// =============================================================================
// Session lifecycle
// =============================================================================

impl Inner {
    fn open(self: &Arc<Self>) {
        self.start_session(None);
    }

    /// Reopen only if no `open()` or `dispose()` happened since `expected`
    /// was current. Returns whether a session was started.
    fn open_if_current(self: &Arc<Self>, expected: u64) -> bool {
        self.start_session(Some(expected))
    }

    fn start_session(self: &Arc<Self>, expected: Option<u64>) -> bool {
        let mut session = self.session.lock();

        let (generation, event) = {
            let mut state = self.state.write();
            if expected.is_some_and(|g| g != state.generation) {
                return false;
            }
            state.generation += 1;
            state.disposed = false;
            (state.generation, state.begin_connection())
        };

        self.cancel_reconnect_timer();
        if let Some(previous) = session.take() {
            previous.abort();
        }

        let opens = self.opens.fetch_add(1, Ordering::Relaxed) + 1;
        self.publish(event);
        info!(
            symbol = %self.context.symbol,
            granularity = self.context.granularity_seconds,
            generation,
            opens,
            "opening gateway connection"
        );

        let inner = Arc::clone(self);
        *session = Some(tokio::spawn(async move {
            inner.run_session(generation).await;
        }));
        true
    }

    fn dispose(&self) {
        let event = {
            let mut state = self.state.write();
            state.generation += 1;
            state.disposed = true;
            state.set_status_keep_error(ConnectionStatus::Disconnected)
        };

        self.cancel_reconnect_timer();
        if let Some(session) = self.session.lock().take() {
            session.abort();
        }

        if event.is_some() {
            info!(symbol = %self.context.symbol, "feed disposed");
        }
        self.publish(event);
    }

    async fn run_session(self: Arc<Self>, generation: u64) {
        let mut connection = match self.connector.connect(&self.settings.endpoint).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(symbol = %self.context.symbol, error = %e, "gateway connection failed");
                self.on_transport_error(generation);
                self.on_transport_closed(generation);
                return;
            }
        };

        if let Err(e) = self.send_subscriptions(connection.as_mut()).await {
            warn!(symbol = %self.context.symbol, error = %e, "failed to send subscription requests");
            self.on_transport_error(generation);
            self.on_transport_closed(generation);
            return;
        }
        self.on_connected(generation);

        loop {
            match connection.recv().await {
                Some(Ok(text)) => self.handle_frame(generation, &text),
                Some(Err(e)) => {
                    warn!(symbol = %self.context.symbol, error = %e, "gateway transport error");
                    self.on_transport_error(generation);
                    break;
                }
                None => {
                    info!(symbol = %self.context.symbol, "gateway connection closed");
                    break;
                }
            }

            if !self.is_current(generation) {
                return;
            }
        }

        drop(connection);
        self.on_transport_closed(generation);
    }

    async fn send_subscriptions(&self, connection: &mut dyn Connection) -> Result<()> {
        let ctx = &self.context;
        if let Some(token) = ctx.auth_token.as_deref() {
            connection.send(codec::authorize_request(token)).await?;
        }
        connection
            .send(codec::candle_history_request(
                &ctx.symbol,
                ctx.granularity_seconds,
                self.settings.candle_capacity,
            ))
            .await?;
        connection
            .send(codec::tick_subscribe_request(&ctx.symbol))
            .await?;
        Ok(())
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        let events = match codec::decode(text) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "dropping malformed gateway message");
                return;
            }
        };
        if events.is_empty() {
            debug!("ignoring unrecognised gateway message");
            return;
        }

        let mut published = Vec::new();
        {
            let mut state = self.state.write();
            if state.generation != generation {
                return;
            }
            for event in events {
                state.apply(event, &mut published);
            }
        }

        for event in published {
            self.publish(Some(event));
        }
    }

    fn on_connected(&self, generation: u64) {
        let event = {
            let mut state = self.state.write();
            if state.generation != generation {
                return;
            }
            state.set_status(ConnectionStatus::Connected, None)
        };
        self.backoff.lock().reset();
        info!(symbol = %self.context.symbol, "gateway connected and subscribed");
        self.publish(event);
    }

    fn on_transport_error(&self, generation: u64) {
        let event = {
            let mut state = self.state.write();
            if state.generation != generation {
                return;
            }
            state.set_status(ConnectionStatus::Error, Some(CONNECTION_ERROR.to_string()))
        };
        self.publish(event);
    }

    fn on_transport_closed(self: &Arc<Self>, generation: u64) {
        let event = {
            let mut state = self.state.write();
            if state.generation != generation {
                return;
            }
            state.set_status_keep_error(ConnectionStatus::Disconnected)
        };
        self.publish(event);
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let mut timer = self.reconnect_timer.lock();
        if !self.is_current(generation) {
            return;
        }
        if let Some((_, previous)) = timer.take() {
            previous.abort();
        }

        let delay = self.backoff.lock().next_delay();
        info!(
            symbol = %self.context.symbol,
            delay_ms = delay.as_millis() as u64,
            "scheduling gateway reconnect"
        );

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach our own handle so the reopen does not abort this task.
            {
                let mut slot = inner.reconnect_timer.lock();
                if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
                    slot.take();
                }
            }
            if !inner.open_if_current(generation) {
                debug!(symbol = %inner.context.symbol, "stale reconnect timer ignored");
            }
        });
        *timer = Some((generation, task));
    }

    fn cancel_reconnect_timer(&self) {
        if let Some((_, timer)) = self.reconnect_timer.lock().take() {
            debug!(symbol = %self.context.symbol, "cancelling pending reconnect");
            timer.abort();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.read().generation == generation
    }

    fn publish(&self, event: Option<FeedEvent>) {
        if let Some(event) = event {
            // No receivers is fine; consumers come and go.
            let _ = self.events.send(event);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
