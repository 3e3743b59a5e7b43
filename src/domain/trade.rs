//! Trade records: created at order submission, finalized at settlement.
//!
//! A trade is mutable while the order is in flight and the position is open;
//! settlement computes the exit price and P&L, after which the record is
//! immutable and appended to the trade journal.
//!
//! Prices live in the held side's own price space (0..1), so P&L for the
//! long position is always `(exit - entry) * size`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{Asset, MarketId, TradeId};
use super::quote::Side;

/// Settlement classification of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Order in flight or position held; not yet settled.
    Open,
    /// Settled with non-negative P&L.
    Converged,
    /// Settled with a loss, or order rejected/expired unfilled.
    Adverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market_id: MarketId,
    pub asset: Asset,
    pub side: Side,
    /// Venue price at submission; replaced by the fill price on fill.
    pub entry_price: f64,
    /// Number of shares. Zero for rejected/unfilled orders.
    pub size: f64,
    /// Model edge observed when the order was submitted.
    pub edge_at_entry: f64,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    pub outcome: Outcome,
}

impl Trade {
    /// Create a trade record at order submission time.
    #[must_use]
    pub fn submitted(
        market_id: MarketId,
        asset: Asset,
        side: Side,
        entry_price: f64,
        size: f64,
        edge_at_entry: f64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TradeId::new(),
            market_id,
            asset,
            side,
            entry_price,
            size,
            edge_at_entry,
            submitted_at,
            filled_at: None,
            exit_price: None,
            pnl: None,
            outcome: Outcome::Open,
        }
    }

    /// Record the venue fill.
    pub fn mark_filled(&mut self, fill_price: f64, filled_at: DateTime<Utc>) {
        self.entry_price = fill_price;
        self.filled_at = Some(filled_at);
    }

    /// Finalize at settlement: compute P&L and classify the outcome.
    pub fn settle(&mut self, exit_price: f64) {
        let pnl = (exit_price - self.entry_price) * self.size;
        self.exit_price = Some(exit_price);
        self.pnl = Some(pnl);
        self.outcome = if pnl >= 0.0 {
            Outcome::Converged
        } else {
            Outcome::Adverse
        };
    }

    /// Finalize with no position: rejected or expired unfilled.
    pub fn void(&mut self) {
        self.size = 0.0;
        self.exit_price = None;
        self.pnl = Some(0.0);
        self.outcome = Outcome::Adverse;
    }

    /// Submission-to-fill latency, if filled.
    #[must_use]
    pub fn fill_latency_ms(&self) -> Option<u64> {
        self.filled_at
            .map(|at| (at - self.submitted_at).num_milliseconds().max(0) as u64)
    }

    /// Dollar notional committed at entry.
    #[must_use]
    pub fn notional(&self) -> f64 {
        self.entry_price * self.size
    }
}
