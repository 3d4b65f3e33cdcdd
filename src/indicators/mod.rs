// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions over closing prices. Every
// series is aligned 1:1 with its input and uses `None` for warm-up positions,
// so consumers can zip it straight against the candle list.
//
// Nothing here is maintained incrementally: `IndicatorSeries::compute` is
// re-run over the full candle series whenever it changes.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

pub use macd::MacdPoint;
pub use rsi::RsiZone;

fn default_sma_period() -> usize {
    20
}

fn default_ema_period() -> usize {
    12
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

/// Look-back periods for every indicator in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_period: default_sma_period(),
            ema_period: default_ema_period(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
        }
    }
}

/// Derived indicator arrays, each the same length as the candle series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSeries {
    pub times: Vec<i64>,
    pub sma: Vec<Option<f64>>,
    pub ema: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<MacdPoint>,
}

impl IndicatorSeries {
    pub fn compute(candles: &[Candle], params: &IndicatorParams) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        Self {
            times: candles.iter().map(|c| c.time).collect(),
            sma: sma::calculate_sma(&closes, params.sma_period),
            ema: ema::calculate_ema(&closes, params.ema_period),
            rsi: rsi::calculate_rsi(&closes, params.rsi_period),
            macd: macd::calculate_macd(
                &closes,
                params.macd_fast,
                params.macd_slow,
                params.macd_signal,
            ),
        }
    }

    /// Last value of every series, for compact readouts.
    pub fn latest(&self) -> LatestIndicators {
        let rsi = self.rsi.last().copied().flatten();
        LatestIndicators {
            sma: self.sma.last().copied().flatten(),
            ema: self.ema.last().copied().flatten(),
            rsi,
            rsi_zone: rsi.map(RsiZone::classify),
            macd: self.macd.last().copied().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatestIndicators {
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub rsi: Option<f64>,
    pub rsi_zone: Option<RsiZone>,
    pub macd: MacdPoint,
}
