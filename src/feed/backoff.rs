// =============================================================================
// Reconnect Backoff — delay before the next connection attempt
// =============================================================================
//
// The default policy waits a fixed 3 s and retries forever. An exponential
// policy (doubling per consecutive failure, capped, with jitter over the upper
// half of the window) can be selected in the runtime config. The attempt
// counter resets whenever a connection is established.
// =============================================================================

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, cap_ms: u64 },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

/// Tracks consecutive failed attempts for a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let attempt = self.attempt;
        self.attempt = self.attempt.saturating_add(1);

        match self.policy {
            ReconnectPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            ReconnectPolicy::Exponential { base_ms, cap_ms } => {
                let ceiling = exponential_ceiling_ms(base_ms, attempt, cap_ms);
                let half = ceiling / 2;
                let jittered = half + rand::thread_rng().gen_range(0..=ceiling - half);
                Duration::from_millis(jittered)
            }
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn exponential_ceiling_ms(base_ms: u64, attempt: u32, cap_ms: u64) -> u64 {
    let multiplier = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(multiplier).min(cap_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_three_seconds() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        for _ in 0..50 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(3_000));
        }
    }

    #[test]
    fn exponential_grows_until_cap() {
        assert_eq!(exponential_ceiling_ms(500, 0, 15_000), 500);
        assert_eq!(exponential_ceiling_ms(500, 3, 15_000), 4_000);
        assert_eq!(exponential_ceiling_ms(500, 10, 15_000), 15_000);
        assert_eq!(exponential_ceiling_ms(500, 200, 15_000), 15_000);
    }

    #[test]
    fn exponential_delay_stays_in_upper_half() {
        let mut backoff = Backoff::new(ReconnectPolicy::Exponential {
            base_ms: 1_000,
            cap_ms: 8_000,
        });
        let bounds = [(500, 1_000), (1_000, 2_000), (2_000, 4_000), (4_000, 8_000), (4_000, 8_000)];
        for (lo, hi) in bounds {
            let ms = backoff.next_delay().as_millis() as u64;
            assert!((lo..=hi).contains(&ms), "{ms} not in {lo}..={hi}");
        }
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = Backoff::new(ReconnectPolicy::Exponential {
            base_ms: 100,
            cap_ms: 10_000,
        });
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt, 0);
        assert!(backoff.next_delay() <= Duration::from_millis(100));
    }

    #[test]
    fn policy_serde_is_tagged() {
        let json = serde_json::to_string(&ReconnectPolicy::default()).unwrap();
        assert_eq!(json, r#"{"kind":"fixed","delay_ms":3000}"#);
        let policy: ReconnectPolicy =
            serde_json::from_str(r#"{"kind":"exponential","base_ms":250,"cap_ms":30000}"#).unwrap();
        assert_eq!(
            policy,
            ReconnectPolicy::Exponential {
                base_ms: 250,
                cap_ms: 30_000
            }
        );
    }
}
