use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLC bar. `time` is the bar open-time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// What [`CandleSeries::apply_update`] did with an incoming bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new bar was pushed (possibly evicting the oldest one).
    Appended,
    /// The still-forming last bar was overwritten.
    Replaced,
    /// The bar was older than the last one and was dropped.
    Discarded,
}

/// Default number of bars retained, matching the history request size.
pub const DEFAULT_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// CandleSeries -- bounded, time-ordered ring of bars
// ---------------------------------------------------------------------------

/// Bounded, chronologically ordered collection of candles for one
/// subscription.
///
/// Invariants: ascending by `time`, no duplicate `time` values, and
/// `len() <= capacity()`.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleSeries {
    /// Create an empty series that retains at most `capacity` bars.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            candles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the whole series with a history batch.
    ///
    /// The batch is sorted by time; when the same `time` appears twice the
    /// later entry wins. Only the `capacity` most recent bars are kept.
    pub fn apply_history(&mut self, mut history: Vec<Candle>) {
        history.sort_by_key(|c| c.time);

        self.candles.clear();
        for candle in history {
            match self.candles.back_mut() {
                Some(last) if last.time == candle.time => *last = candle,
                _ => self.candles.push_back(candle),
            }
        }

        while self.candles.len() > self.capacity {
            self.candles.pop_front();
        }
    }

    /// Merge a single live bar.
    ///
    /// * empty series or newer bar => append, evicting the oldest when full
    /// * same `time` as the last bar => replace the last bar in place
    /// * older than the last bar => discard, the series is untouched
    pub fn apply_update(&mut self, candle: Candle) -> MergeOutcome {
        let Some(last) = self.candles.back_mut() else {
            self.candles.push_back(candle);
            return MergeOutcome::Appended;
        };

        if candle.time == last.time {
            *last = candle;
            MergeOutcome::Replaced
        } else if candle.time > last.time {
            if self.candles.len() == self.capacity {
                self.candles.pop_front();
            }
            self.candles.push_back(candle);
            MergeOutcome::Appended
        } else {
            debug!(
                time = candle.time,
                last_time = last.time,
                "discarding out-of-order candle update"
            );
            MergeOutcome::Discarded
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Owned snapshot in chronological order.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.iter().copied().collect()
    }
}

impl Default for CandleSeries {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
        }
    }

    fn closes(series: &CandleSeries) -> Vec<f64> {
        series.iter().map(|c| c.close).collect()
    }

    fn assert_invariants(series: &CandleSeries) {
        assert!(series.len() <= series.capacity());
        let times: Vec<i64> = series.iter().map(|c| c.time).collect();
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1], "series not strictly ascending: {times:?}");
        }
    }

    #[test]
    fn update_on_empty_appends() {
        let mut series = CandleSeries::new(10);
        assert_eq!(series.apply_update(candle(0, 1.0)), MergeOutcome::Appended);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn same_time_replaces_last() {
        let mut series = CandleSeries::default();
        series.apply_history(vec![candle(0, 10.0)]);

        let outcome = series.apply_update(candle(0, 12.0));

        assert_eq!(outcome, MergeOutcome::Replaced);
        assert_eq!(series.to_vec(), vec![candle(0, 12.0)]);
    }

    #[test]
    fn repeated_update_is_idempotent() {
        let mut series = CandleSeries::default();
        series.apply_history(vec![candle(0, 1.0), candle(60_000, 2.0)]);

        series.apply_update(candle(60_000, 3.0));
        let once = series.to_vec();
        series.apply_update(candle(60_000, 3.0));

        assert_eq!(series.to_vec(), once);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn stale_update_never_changes_series() {
        let mut series = CandleSeries::default();
        series.apply_history(vec![candle(0, 1.0), candle(60_000, 2.0), candle(120_000, 3.0)]);
        let before = series.to_vec();

        assert_eq!(series.apply_update(candle(60_000, 99.0)), MergeOutcome::Discarded);
        assert_eq!(series.apply_update(candle(-5, 99.0)), MergeOutcome::Discarded);

        assert_eq!(series.to_vec(), before);
    }

    #[test]
    fn sliding_window_drops_oldest() {
        let mut series = CandleSeries::new(3);
        for i in 0..5 {
            series.apply_update(candle(i * 60_000, 100.0 + i as f64));
        }

        assert_eq!(series.len(), 3);
        assert_eq!(closes(&series), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn default_capacity_is_one_hundred() {
        let mut series = CandleSeries::default();
        for i in 0..250 {
            series.apply_update(candle(i, i as f64));
        }
        assert_eq!(series.len(), 100);
        assert_eq!(series.iter().next().map(|c| c.time), Some(150));
        assert_eq!(series.last().map(|c| c.time), Some(249));
    }

    #[test]
    fn history_is_sorted_deduplicated_and_truncated() {
        let mut series = CandleSeries::new(3);
        series.apply_history(vec![
            candle(300, 4.0),
            candle(100, 2.0),
            candle(0, 1.0),
            candle(200, 3.0),
            candle(200, 3.5),
        ]);

        let times: Vec<i64> = series.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(closes(&series), vec![2.0, 3.5, 4.0]);
    }

    #[test]
    fn history_replaces_previous_contents() {
        let mut series = CandleSeries::default();
        series.apply_history(vec![candle(0, 1.0), candle(60, 2.0)]);
        series.apply_history(vec![candle(500, 9.0)]);
        assert_eq!(series.to_vec(), vec![candle(500, 9.0)]);
    }

    #[test]
    fn arbitrary_update_streams_keep_invariants() {
        // Small LCG so the sequence is deterministic without extra crates.
        let mut seed: u64 = 0x5eed;
        let mut next = move || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 33) as i64
        };

        for capacity in [1, 2, 7, 100] {
            let mut series = CandleSeries::new(capacity);
            for _ in 0..1_000 {
                let time = next() % 400;
                let before = series.to_vec();
                let outcome = series.apply_update(candle(time, time as f64));
                match outcome {
                    MergeOutcome::Discarded => assert_eq!(series.to_vec(), before),
                    MergeOutcome::Replaced => assert_eq!(series.len(), before.len()),
                    MergeOutcome::Appended => {
                        assert_eq!(series.last().map(|c| c.time), Some(time))
                    }
                }
                assert_invariants(&series);
            }
        }
    }
}
