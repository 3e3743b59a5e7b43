//! Spot price ticks and volatility snapshots.
//!
//! Both are latest-value-only: the engine never queues superseded updates.
//! A tick or vol snapshot older than its configured staleness bound marks the
//! feed as down for the owning asset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::id::Asset;

/// A single spot price observation from the normalized exchange feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub asset: Asset,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
    /// Exchange-to-engine latency reported by the feed normalizer.
    pub source_latency_ms: u64,
}

impl Tick {
    /// Age of this tick relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.observed_at
    }

    /// True when the tick is older than `bound_secs`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, bound_secs: u64) -> bool {
        self.age(now) > Duration::seconds(bound_secs as i64)
    }
}

/// Implied volatility scalar for one asset, replaced in place on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolSnapshot {
    pub asset: Asset,
    /// Annualized implied volatility, e.g. 0.55 for 55%.
    pub implied_vol: f64,
    pub observed_at: DateTime<Utc>,
}

impl VolSnapshot {
    /// True when the snapshot is older than `bound_secs`.
    ///
    /// Stale volatility is a hard error for fair-value computation; the
    /// caller must suspend divergence detection, never substitute a default.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, bound_secs: u64) -> bool {
        now - self.observed_at > Duration::seconds(bound_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_at(offset_secs: i64) -> Tick {
        Tick {
            asset: Asset::from("btc"),
            price: 65000.0,
            observed_at: Utc::now() - Duration::seconds(offset_secs),
            source_latency_ms: 12,
        }
    }

    #[test]
    fn fresh_tick_is_not_stale() {
        let tick = tick_at(1);
        assert!(!tick.is_stale(Utc::now(), 5));
    }

    #[test]
    fn old_tick_is_stale() {
        let tick = tick_at(30);
        assert!(tick.is_stale(Utc::now(), 5));
    }

    #[test]
    fn vol_staleness_bound_is_exclusive() {
        let now = Utc::now();
        let vol = VolSnapshot {
            asset: Asset::from("eth"),
            implied_vol: 0.6,
            observed_at: now - Duration::seconds(10),
        };
        assert!(!vol.is_stale(now, 10));
        assert!(vol.is_stale(now, 9));
    }
}
