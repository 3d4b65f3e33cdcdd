// =============================================================================
// Tick State — last quote, previous quote and direction
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PriceDirection;

/// The most recent quote received from the tick stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub time: DateTime<Utc>,
    /// Price of the tick this one replaced; `None` on the first tick of a
    /// connection.
    pub previous_price: Option<f64>,
}

impl Tick {
    /// `Same` when there is no previous price or the price did not move.
    pub fn direction(&self) -> PriceDirection {
        match self.previous_price {
            Some(prev) if self.price > prev => PriceDirection::Up,
            Some(prev) if self.price < prev => PriceDirection::Down,
            _ => PriceDirection::Same,
        }
    }
}

/// Holds the latest tick; every inbound quote replaces it atomically.
#[derive(Debug, Clone, Default)]
pub struct TickState {
    current: Option<Tick>,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the current price into `previous_price` and store the new quote.
    pub fn apply_tick(&mut self, price: f64, time: DateTime<Utc>) -> Tick {
        let tick = Tick {
            price,
            time,
            previous_price: self.current.map(|t| t.price),
        };
        self.current = Some(tick);
        tick
    }

    pub fn current(&self) -> Option<Tick> {
        self.current
    }

    pub fn direction(&self) -> PriceDirection {
        self.current
            .map(|t| t.direction())
            .unwrap_or_default()
    }

    /// Forget the previous quote (used when a fresh connection starts).
    pub fn reset(&mut self) {
        self.current = None;
    }
}
