//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests). Provides concise factory functions for domain
//! primitives so tests focus on assertions rather than construction
//! boilerplate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Asset, MarketBook, MarketId, SideBook, Tick, VolSnapshot, WindowSpec};
use crate::risk::{RiskLedger, RiskLimits};

/// A BTC tick at the given price, observed `now`.
pub fn tick(asset: &str, price: f64, at: DateTime<Utc>) -> Tick {
    Tick {
        asset: Asset::from(asset),
        price,
        observed_at: at,
        source_latency_ms: 5,
    }
}

/// A fresh vol snapshot with the given annualized implied vol.
pub fn vol(asset: &str, implied_vol: f64, at: DateTime<Utc>) -> VolSnapshot {
    VolSnapshot {
        asset: Asset::from(asset),
        implied_vol,
        observed_at: at,
    }
}

/// A coherent two-sided book with the given YES mid and a 2c spread.
/// The NO side mirrors it so the pair sums to 1.0.
pub fn balanced_book(yes_mid: f64, at: DateTime<Utc>) -> MarketBook {
    MarketBook::new(
        SideBook::from_touch(yes_mid - 0.01, yes_mid + 0.01),
        SideBook::from_touch(1.0 - yes_mid - 0.01, 1.0 - yes_mid + 0.01),
        at,
    )
}

/// A 5-minute window spec for the asset, opening at `opens_at`.
pub fn window_spec(asset: &str, opens_at: DateTime<Utc>) -> WindowSpec {
    WindowSpec {
        asset: Asset::from(asset),
        market_id: MarketId::from(format!("{asset}-updown-300s-{}", opens_at.timestamp())),
        opens_at,
        duration_secs: 300,
    }
}

/// A $1000 ledger with a $200 daily cap and room for three positions.
pub fn ledger() -> RiskLedger {
    ledger_with_cap(Decimal::from(200))
}

/// A $1000 ledger with the given daily cap.
pub fn ledger_with_cap(cap: Decimal) -> RiskLedger {
    RiskLedger::new(
        Decimal::from(1000),
        RiskLimits {
            daily_cap_limit: cap,
            max_open_positions: 3,
            max_position_pct: 0.01,
        },
        Utc::now(),
    )
}
