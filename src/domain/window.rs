//! Fixed-duration binary outcome market windows.
//!
//! A [`MarketWindow`] is owned exclusively by its asset's state machine. The
//! open price is captured once at window open and acts as the strike for the
//! fair-value model; it never changes afterwards.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::id::{Asset, MarketId};

/// Lifecycle state of a window as tracked by its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// No active window for the asset.
    Idle,
    /// Window open, recomputing quotes on every tick and book update.
    Monitoring,
    /// A divergence episode is open and being timed.
    Divergence,
    /// Budget granted, order in flight.
    Executing,
    /// Position established, holding to expiry.
    Filled,
    /// Window resolved; terminal for this window.
    Settled,
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Monitoring => "monitoring",
            Self::Divergence => "divergence",
            Self::Executing => "executing",
            Self::Filled => "filled",
            Self::Settled => "settled",
        };
        write!(f, "{s}")
    }
}

/// A window surfaced by market discovery, before the open price is captured.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub asset: Asset,
    pub market_id: MarketId,
    pub opens_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl WindowSpec {
    /// Expiry timestamp: `opens_at + duration`.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.opens_at + Duration::seconds(self.duration_secs as i64)
    }
}

/// An active market window with its captured open price.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketWindow {
    pub asset: Asset,
    pub market_id: MarketId,
    pub opened_at: DateTime<Utc>,
    pub duration_secs: u64,
    /// Strike for the fair-value model; immutable after capture.
    pub open_price: f64,
}

impl MarketWindow {
    /// Open a window from a discovery spec, capturing the current spot as
    /// the strike.
    #[must_use]
    pub fn open(spec: WindowSpec, open_price: f64, opened_at: DateTime<Utc>) -> Self {
        Self {
            asset: spec.asset,
            market_id: spec.market_id,
            opened_at,
            duration_secs: spec.duration_secs,
            open_price,
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.opened_at + Duration::seconds(self.duration_secs as i64)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Seconds until expiry, clamped at zero.
    #[must_use]
    pub fn time_remaining_secs(&self, now: DateTime<Utc>) -> f64 {
        let remaining = (self.expires_at() - now).num_milliseconds() as f64 / 1000.0;
        remaining.max(0.0)
    }

    /// Signed fractional move of `spot` from the open price.
    #[must_use]
    pub fn move_pct(&self, spot: f64) -> f64 {
        if self.open_price <= 0.0 {
            return 0.0;
        }
        (spot - self.open_price) / self.open_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(duration_secs: u64) -> MarketWindow {
        MarketWindow {
            asset: Asset::from("btc"),
            market_id: MarketId::from("btc-updown-5m-0"),
            opened_at: Utc::now(),
            duration_secs,
            open_price: 65000.0,
        }
    }

    #[test]
    fn expiry_from_duration() {
        let w = window(300);
        assert_eq!(w.expires_at(), w.opened_at + Duration::seconds(300));
        assert!(!w.is_expired(w.opened_at + Duration::seconds(299)));
        assert!(w.is_expired(w.opened_at + Duration::seconds(300)));
    }

    #[test]
    fn time_remaining_clamps_at_zero() {
        let w = window(300);
        let past_expiry = w.opened_at + Duration::seconds(400);
        assert_eq!(w.time_remaining_secs(past_expiry), 0.0);
    }

    #[test]
    fn move_pct_is_signed() {
        let w = window(300);
        assert!(w.move_pct(65200.0) > 0.0);
        assert!(w.move_pct(64800.0) < 0.0);
        assert_eq!(w.move_pct(65000.0), 0.0);
    }

    #[test]
    fn state_display_matches_dashboard_contract() {
        assert_eq!(WindowState::Monitoring.to_string(), "monitoring");
        assert_eq!(WindowState::Divergence.to_string(), "divergence");
        assert_eq!(WindowState::Settled.to_string(), "settled");
    }
}
