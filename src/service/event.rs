//! Structured lifecycle events emitted by the window state machines.
//!
//! One event per state transition, carrying the asset, market identifier,
//! and numeric context. Events are side-effect only: nothing in the engine
//! gates on whether an event was delivered.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Asset, MarketId, Side, Trade};

/// Alert severity as surfaced to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Engine lifecycle event.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    WindowOpened {
        asset: Asset,
        market_id: MarketId,
        open_price: f64,
        at: DateTime<Utc>,
    },
    WindowClosed {
        asset: Asset,
        market_id: MarketId,
        move_pct: f64,
        at: DateTime<Utc>,
    },
    DivergenceOpened {
        asset: Asset,
        market_id: MarketId,
        side: Side,
        edge: f64,
        at: DateTime<Utc>,
    },
    DivergenceDecayed {
        asset: Asset,
        market_id: MarketId,
        side: Side,
        peak_edge: f64,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    Executing {
        asset: Asset,
        market_id: MarketId,
        side: Side,
        price: f64,
        size: f64,
        edge: f64,
        dry_run: bool,
        at: DateTime<Utc>,
    },
    Filled {
        asset: Asset,
        market_id: MarketId,
        side: Side,
        price: f64,
        size: f64,
        latency_ms: u64,
        at: DateTime<Utc>,
    },
    /// Window settled with non-negative P&L on the held position.
    Converged { trade: Trade, at: DateTime<Utc> },
    /// Window settled at a loss, or the order was rejected/unfilled.
    Adverse { trade: Trade, at: DateTime<Utc> },
    FeedStale {
        asset: Asset,
        feed: String,
        age_ms: u64,
        at: DateTime<Utc>,
    },
    RiskDenied {
        asset: Asset,
        market_id: MarketId,
        reason: String,
        at: DateTime<Utc>,
    },
    VenueError {
        asset: Asset,
        market_id: MarketId,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Alert category string, as consumed by the dashboard event log.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::WindowOpened { .. } => "window_open",
            Self::WindowClosed { .. } => "window_close",
            Self::DivergenceOpened { .. } => "divergence",
            Self::DivergenceDecayed { .. } => "divergence_decay",
            Self::Executing { .. } => "executing",
            Self::Filled { .. } => "fill",
            Self::Converged { .. } => "converge",
            Self::Adverse { .. } => "adverse",
            Self::FeedStale { .. } => "feed_stale",
            Self::RiskDenied { .. } => "risk_denied",
            Self::VenueError { .. } => "venue_error",
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::WindowOpened { .. }
            | Self::WindowClosed { .. }
            | Self::DivergenceOpened { .. }
            | Self::DivergenceDecayed { .. }
            | Self::Executing { .. }
            | Self::Filled { .. }
            | Self::Converged { .. } => Severity::Info,
            Self::Adverse { .. } | Self::FeedStale { .. } | Self::RiskDenied { .. } => {
                Severity::Warning
            }
            Self::VenueError { .. } => Severity::Critical,
        }
    }

    /// Event timestamp.
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::WindowOpened { at, .. }
            | Self::WindowClosed { at, .. }
            | Self::DivergenceOpened { at, .. }
            | Self::DivergenceDecayed { at, .. }
            | Self::Executing { at, .. }
            | Self::Filled { at, .. }
            | Self::Converged { at, .. }
            | Self::Adverse { at, .. }
            | Self::FeedStale { at, .. }
            | Self::RiskDenied { at, .. }
            | Self::VenueError { at, .. } => *at,
        }
    }

    /// Human-readable alert message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::WindowOpened {
                asset,
                market_id,
                open_price,
                ..
            } => format!(
                "{} window opened: {} @ ${:.2}",
                asset.as_str().to_uppercase(),
                market_id,
                open_price
            ),
            Self::WindowClosed {
                asset, move_pct, ..
            } => format!(
                "{} window closed: {:.3}% move",
                asset.as_str().to_uppercase(),
                move_pct * 100.0
            ),
            Self::DivergenceOpened {
                asset, side, edge, ..
            } => format!(
                "{} divergence opened on {side}: edge {:.4}",
                asset.as_str().to_uppercase(),
                edge
            ),
            Self::DivergenceDecayed {
                asset,
                side,
                peak_edge,
                duration_ms,
                ..
            } => format!(
                "{} divergence on {side} decayed after {duration_ms}ms (peak {:.4})",
                asset.as_str().to_uppercase(),
                peak_edge
            ),
            Self::Executing {
                asset,
                side,
                price,
                size,
                dry_run,
                ..
            } => format!(
                "{} executing {side} {:.1} @ {:.4}{}",
                asset.as_str().to_uppercase(),
                size,
                price,
                if *dry_run { " (dry run)" } else { "" }
            ),
            Self::Filled {
                asset,
                side,
                price,
                latency_ms,
                ..
            } => format!(
                "{} {side} filled @ {:.4} in {latency_ms}ms",
                asset.as_str().to_uppercase(),
                price
            ),
            Self::Converged { trade, .. } => format!(
                "{} converged: {:+.2} on {}",
                trade.asset.as_str().to_uppercase(),
                trade.pnl.unwrap_or(0.0),
                trade.market_id
            ),
            Self::Adverse { trade, .. } => format!(
                "{} adverse: {:+.2} on {}",
                trade.asset.as_str().to_uppercase(),
                trade.pnl.unwrap_or(0.0),
                trade.market_id
            ),
            Self::FeedStale {
                asset, feed, age_ms, ..
            } => format!(
                "{} {feed} feed stale for {age_ms}ms, detection suspended",
                asset.as_str().to_uppercase()
            ),
            Self::RiskDenied { asset, reason, .. } => format!(
                "{} reservation denied: {reason}",
                asset.as_str().to_uppercase()
            ),
            Self::VenueError { asset, reason, .. } => {
                format!("{} venue error: {reason}", asset.as_str().to_uppercase())
            }
        }
    }

    /// Structured numeric context for the alert journal.
    #[must_use]
    pub fn context(&self) -> serde_json::Value {
        match self {
            Self::WindowOpened {
                asset,
                market_id,
                open_price,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "open_price": open_price,
            }),
            Self::WindowClosed {
                asset,
                market_id,
                move_pct,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "move_pct": move_pct * 100.0,
            }),
            Self::DivergenceOpened {
                asset,
                market_id,
                side,
                edge,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "side": side, "edge": edge,
            }),
            Self::DivergenceDecayed {
                asset,
                market_id,
                side,
                peak_edge,
                duration_ms,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "side": side,
                "peak_edge": peak_edge, "duration_ms": duration_ms,
            }),
            Self::Executing {
                asset,
                market_id,
                side,
                price,
                size,
                edge,
                dry_run,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "side": side,
                "price": price, "size": size, "edge": edge, "dry_run": dry_run,
            }),
            Self::Filled {
                asset,
                market_id,
                side,
                price,
                size,
                latency_ms,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "side": side,
                "price": price, "size": size, "latency_ms": latency_ms,
            }),
            Self::Converged { trade, .. } | Self::Adverse { trade, .. } => {
                serde_json::to_value(trade).unwrap_or_default()
            }
            Self::FeedStale {
                asset, feed, age_ms, ..
            } => serde_json::json!({
                "asset": asset, "feed": feed, "age_ms": age_ms,
            }),
            Self::RiskDenied {
                asset,
                market_id,
                reason,
                ..
            }
            | Self::VenueError {
                asset,
                market_id,
                reason,
                ..
            } => serde_json::json!({
                "asset": asset, "market_id": market_id, "reason": reason,
            }),
        }
    }

    /// The finalized trade, for events that settle one.
    #[must_use]
    pub fn settled_trade(&self) -> Option<&Trade> {
        match self {
            Self::Converged { trade, .. } | Self::Adverse { trade, .. } => Some(trade),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_match_dashboard_contract() {
        let ev = EngineEvent::WindowOpened {
            asset: Asset::from("btc"),
            market_id: MarketId::from("m"),
            open_price: 65000.0,
            at: Utc::now(),
        };
        assert_eq!(ev.category(), "window_open");
        assert_eq!(ev.severity(), Severity::Info);
        assert!(ev.message().contains("BTC"));
    }

    #[test]
    fn adverse_is_warning() {
        let mut trade = Trade::submitted(
            MarketId::from("m"),
            Asset::from("eth"),
            Side::No,
            0.5,
            10.0,
            0.08,
            Utc::now(),
        );
        trade.settle(0.0);
        let ev = EngineEvent::Adverse {
            trade,
            at: Utc::now(),
        };
        assert_eq!(ev.severity(), Severity::Warning);
        assert_eq!(ev.category(), "adverse");
        assert!(ev.settled_trade().is_some());
    }
}
