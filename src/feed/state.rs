// =============================================================================
// Feed State — everything one subscription has learned from the gateway
// =============================================================================
//
// Mutated only by the connection manager, one inbound frame at a time, under
// a single write lock. `generation` identifies the session allowed to mutate;
// frames from a superseded or disposed session are ignored.
// =============================================================================

use serde::Serialize;
use tracing::{debug, warn};

use crate::gateway::GatewayEvent;
use crate::market_data::{Candle, CandleSeries, MergeOutcome, Tick, TickState};
use crate::types::{ConnectionStatus, PriceDirection};

/// Generic message recorded when the transport reports a fault.
pub const CONNECTION_ERROR: &str = "Connection error";

/// State-change notification published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    StatusChanged {
        status: ConnectionStatus,
        error: Option<String>,
    },
    CandlesChanged {
        len: usize,
        last: Option<Candle>,
    },
    TickChanged {
        tick: Tick,
        direction: PriceDirection,
    },
    BalanceChanged {
        balance: f64,
    },
}

/// Point-in-time copy of the feed for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub symbol: String,
    pub granularity_seconds: u32,
    pub status: ConnectionStatus,
    pub error: Option<String>,
    pub candles: Vec<Candle>,
    pub tick: Option<Tick>,
    pub direction: PriceDirection,
    pub balance: Option<f64>,
    pub subscription_id: Option<String>,
    pub version: u64,
}

#[derive(Debug)]
pub struct FeedState {
    pub(super) generation: u64,
    pub(super) disposed: bool,
    status: ConnectionStatus,
    error: Option<String>,
    candles: CandleSeries,
    tick: TickState,
    balance: Option<f64>,
    subscription_id: Option<String>,
    version: u64,
}

impl FeedState {
    pub fn new(candle_capacity: usize) -> Self {
        Self {
            generation: 0,
            disposed: false,
            status: ConnectionStatus::Connecting,
            error: None,
            candles: CandleSeries::new(candle_capacity),
            tick: TickState::new(),
            balance: None,
            subscription_id: None,
            version: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn candles(&self) -> &CandleSeries {
        &self.candles
    }

    pub fn tick(&self) -> Option<Tick> {
        self.tick.current()
    }

    pub fn direction(&self) -> PriceDirection {
        self.tick.direction()
    }

    pub fn balance(&self) -> Option<f64> {
        self.balance
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Record a new status (and error text). Returns the event to publish,
    /// or `None` when nothing changed.
    pub fn set_status(
        &mut self,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Option<FeedEvent> {
        if self.status == status && self.error == error {
            return None;
        }
        self.status = status;
        self.error = error.clone();
        self.version += 1;
        Some(FeedEvent::StatusChanged { status, error })
    }

    /// Transition to `status` while keeping the stored error message.
    pub fn set_status_keep_error(&mut self, status: ConnectionStatus) -> Option<FeedEvent> {
        let error = self.error.clone();
        self.set_status(status, error)
    }

    /// A new connection attempt starts: status `connecting`, no error, and
    /// the next tick has no previous price.
    pub fn begin_connection(&mut self) -> Option<FeedEvent> {
        self.tick.reset();
        self.set_status(ConnectionStatus::Connecting, None)
    }

    /// Apply one decoded gateway event, pushing any resulting notifications.
    pub fn apply(&mut self, event: GatewayEvent, out: &mut Vec<FeedEvent>) {
        match event {
            GatewayEvent::Authorize { balance } | GatewayEvent::Balance { balance } => {
                if let Some(balance) = balance {
                    self.balance = Some(balance);
                    self.version += 1;
                    out.push(FeedEvent::BalanceChanged { balance });
                }
            }
            GatewayEvent::Candles(history) => {
                self.candles.apply_history(history);
                self.version += 1;
                debug!(
                    len = self.candles.len(),
                    capacity = self.candles.capacity(),
                    "candle history applied"
                );
                out.push(self.candles_changed());
            }
            GatewayEvent::Ohlc(candle) => match self.candles.apply_update(candle) {
                MergeOutcome::Appended | MergeOutcome::Replaced => {
                    self.version += 1;
                    out.push(self.candles_changed());
                }
                MergeOutcome::Discarded => {}
            },
            GatewayEvent::Tick { quote, time } => {
                let tick = self.tick.apply_tick(quote, time);
                self.version += 1;
                out.push(FeedEvent::TickChanged {
                    tick,
                    direction: tick.direction(),
                });
            }
            GatewayEvent::Subscription { id } => {
                if self.subscription_id.as_deref() != Some(id.as_str()) {
                    debug!(subscription_id = %id, "subscription acknowledged");
                    self.subscription_id = Some(id);
                }
            }
            GatewayEvent::Error { code, message } => {
                warn!(code = ?code, message = %message, "gateway reported an error");
                if let Some(ev) = self.set_status(ConnectionStatus::Error, Some(message)) {
                    out.push(ev);
                }
            }
        }
    }

    fn candles_changed(&self) -> FeedEvent {
        FeedEvent::CandlesChanged {
            len: self.candles.len(),
            last: self.candles.last().copied(),
        }
    }

    pub fn snapshot(&self, symbol: &str, granularity_seconds: u32) -> FeedSnapshot {
        FeedSnapshot {
            symbol: symbol.to_string(),
            granularity_seconds,
            status: self.status,
            error: self.error.clone(),
            candles: self.candles.to_vec(),
            tick: self.tick.current(),
            direction: self.tick.direction(),
            balance: self.balance,
            subscription_id: self.subscription_id.clone(),
            version: self.version,
        }
    }
}
