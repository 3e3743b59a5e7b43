//! Shared application state.
//!
//! Read-mostly views published by the asset runners and the feed pump for
//! the status surface. The risk ledger is deliberately not in here: it has
//! its own serialized entry point.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::RwLock;

use crate::domain::{Asset, Outcome, Trade};
use crate::service::status::{FeedStatus, TradeSummary, WindowStatus};

/// How many finalized trades the status surface keeps in memory.
const RECENT_TRADES: usize = 100;

#[derive(Debug, Clone, Default)]
struct FeedHealth {
    connected: bool,
    latency_ms: u64,
}

/// Rolling log of finalized trades plus aggregate counters.
#[derive(Debug, Default)]
struct TradeLog {
    recent: VecDeque<Trade>,
    wins: u64,
    losses: u64,
    edge_sum: f64,
    edge_count: u64,
    latency_sum_ms: u64,
    latency_count: u64,
}

impl TradeLog {
    fn record(&mut self, trade: &Trade) {
        match trade.outcome {
            Outcome::Converged => self.wins += 1,
            Outcome::Adverse => self.losses += 1,
            Outcome::Open => {}
        }
        if trade.size > 0.0 {
            self.edge_sum += trade.edge_at_entry.abs();
            self.edge_count += 1;
        }
        if let Some(latency) = trade.fill_latency_ms() {
            self.latency_sum_ms += latency;
            self.latency_count += 1;
        }

        self.recent.push_front(trade.clone());
        self.recent.truncate(RECENT_TRADES);
    }

    fn avg_edge(&self) -> f64 {
        if self.edge_count == 0 {
            0.0
        } else {
            self.edge_sum / self.edge_count as f64
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            0.0
        } else {
            self.latency_sum_ms as f64 / self.latency_count as f64
        }
    }
}

/// Shared state accessible by all tasks.
#[derive(Default)]
pub struct AppState {
    windows: RwLock<HashMap<Asset, WindowStatus>>,
    feeds: RwLock<BTreeMap<String, FeedHealth>>,
    trades: RwLock<TradeLog>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the latest window snapshot for an asset.
    pub fn set_window(&self, asset: &Asset, status: WindowStatus) {
        self.windows.write().insert(asset.clone(), status);
    }

    /// All current window snapshots, ordered by asset for stable output.
    #[must_use]
    pub fn window_statuses(&self) -> Vec<WindowStatus> {
        let windows = self.windows.read();
        let mut keys: Vec<&Asset> = windows.keys().collect();
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        keys.into_iter()
            .filter_map(|k| windows.get(k).cloned())
            .collect()
    }

    /// Update a feed's health indicator.
    pub fn set_feed(&self, name: &str, connected: bool, latency_ms: u64) {
        let mut feeds = self.feeds.write();
        let entry = feeds.entry(name.to_string()).or_default();
        entry.connected = connected;
        entry.latency_ms = latency_ms;
    }

    #[must_use]
    pub fn feed_statuses(&self) -> Vec<FeedStatus> {
        self.feeds
            .read()
            .iter()
            .map(|(name, health)| FeedStatus {
                name: name.clone(),
                connected: health.connected,
                latency_ms: health.latency_ms,
            })
            .collect()
    }

    /// Record a finalized trade for the status surface.
    pub fn record_settled(&self, trade: &Trade) {
        self.trades.write().record(trade);
    }

    #[must_use]
    pub fn recent_trades(&self) -> Vec<Trade> {
        self.trades.read().recent.iter().cloned().collect()
    }

    /// Aggregate counters, with P&L figures and the open-position count
    /// supplied by the ledger snapshot.
    #[must_use]
    pub fn trade_summary(
        &self,
        open: u64,
        total_pnl: f64,
        session_pnl: f64,
        daily_pnl: f64,
    ) -> TradeSummary {
        let log = self.trades.read();
        TradeSummary {
            wins: log.wins,
            losses: log.losses,
            open,
            total_pnl,
            session_pnl,
            daily_pnl,
            avg_edge: log.avg_edge(),
            avg_latency_ms: log.avg_latency_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketId, Side};
    use chrono::{Duration, Utc};

    fn settled(pnl_positive: bool) -> Trade {
        let mut t = Trade::submitted(
            MarketId::from("m"),
            Asset::from("btc"),
            Side::Yes,
            0.5,
            100.0,
            0.08,
            Utc::now(),
        );
        t.mark_filled(0.5, t.submitted_at + Duration::milliseconds(30));
        t.settle(if pnl_positive { 1.0 } else { 0.0 });
        t
    }

    #[test]
    fn counters_track_outcomes() {
        let state = AppState::new();
        state.record_settled(&settled(true));
        state.record_settled(&settled(true));
        state.record_settled(&settled(false));

        let summary = state.trade_summary(1, 50.0, 50.0, 50.0);
        assert_eq!(summary.wins, 2);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.open, 1);
        assert!((summary.avg_edge - 0.08).abs() < 1e-12);
        assert!((summary.avg_latency_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn recent_trades_newest_first_and_bounded() {
        let state = AppState::new();
        for _ in 0..150 {
            state.record_settled(&settled(true));
        }
        let recent = state.recent_trades();
        assert_eq!(recent.len(), RECENT_TRADES);
    }

    #[test]
    fn window_statuses_sorted_by_asset() {
        let state = AppState::new();
        for asset in ["eth", "btc", "sol"] {
            state.set_window(
                &Asset::from(asset),
                WindowStatus {
                    asset: asset.to_string(),
                    market_id: "m".to_string(),
                    state: "monitoring".to_string(),
                    open_price: 0.0,
                    current_move_pct: 0.0,
                    time_remaining_sec: 0.0,
                    fair_yes: 0.5,
                    fair_no: 0.5,
                    clob_yes_mid: 0.5,
                    clob_no_mid: 0.5,
                    edge_yes: 0.0,
                    edge_no: 0.0,
                    divergence_open: false,
                    divergence_since: None,
                },
            );
        }
        let statuses = state.window_statuses();
        let assets: Vec<&str> = statuses.iter().map(|s| s.asset.as_str()).collect();
        assert_eq!(assets, vec!["btc", "eth", "sol"]);
    }
}
