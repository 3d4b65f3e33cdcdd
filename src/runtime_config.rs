// =============================================================================
// Runtime Configuration — feed settings with env overrides and atomic save
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file. The gateway auth token is only ever taken from the environment
// and is never written back to disk.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::feed::{FeedSettings, ReconnectPolicy, SubscriptionContext};
use crate::gateway::{endpoint_url, DEFAULT_GATEWAY_URL};
use crate::indicators::IndicatorParams;
use crate::market_data::candle_series::DEFAULT_CAPACITY;
use crate::markets;
use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_app_id() -> String {
    "1089".to_string()
}

fn default_symbol() -> String {
    "R_25".to_string()
}

fn default_candle_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Gateway ------------------------------------------------------------

    /// WebSocket URL without the `app_id` query parameter.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Account token sent in an `authorize` request. Environment only.
    #[serde(skip)]
    pub auth_token: Option<String>,

    // --- Subscription -------------------------------------------------------

    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default)]
    pub timeframe: Timeframe,

    /// History request size and candle series bound.
    #[serde(default = "default_candle_capacity")]
    pub candle_capacity: usize,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    // --- Derived data -------------------------------------------------------

    #[serde(default)]
    pub indicators: IndicatorParams,

    // --- HTTP surface -------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            app_id: default_app_id(),
            auth_token: None,
            symbol: default_symbol(),
            timeframe: Timeframe::default(),
            candle_capacity: default_candle_capacity(),
            reconnect: ReconnectPolicy::default(),
            indicators: IndicatorParams::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            timeframe = %config.timeframe,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `DERIV_*` / `PULSE_BIND_ADDR` overrides from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored;
    /// an unparseable timeframe is logged and the configured one kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(app_id) = get("DERIV_APP_ID") {
            self.app_id = app_id;
        }
        if let Some(symbol) = get("DERIV_SYMBOL") {
            self.symbol = symbol;
        }
        if let Some(raw) = get("DERIV_TIMEFRAME") {
            match raw.parse::<Timeframe>() {
                Ok(tf) => self.timeframe = tf,
                Err(e) => warn!(value = %raw, error = %e, "ignoring DERIV_TIMEFRAME"),
            }
        }
        if let Some(token) = get("DERIV_API_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(addr) = get("PULSE_BIND_ADDR") {
            self.bind_addr = addr;
        }

        if markets::find(&self.symbol).is_none() {
            warn!(symbol = %self.symbol, "symbol is not in the market catalogue; subscribing anyway");
        }
    }

    /// Full gateway URL including `app_id`.
    pub fn endpoint(&self) -> String {
        endpoint_url(&self.gateway_url, &self.app_id)
    }

    pub fn subscription_context(&self) -> SubscriptionContext {
        SubscriptionContext {
            symbol: self.symbol.clone(),
            granularity_seconds: self.timeframe.granularity_seconds(),
            auth_token: self.auth_token.clone(),
        }
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            endpoint: self.endpoint(),
            candle_capacity: self.candle_capacity.max(1),
            reconnect: self.reconnect,
        }
    }
}
