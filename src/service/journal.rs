//! Append-only JSONL journals consumed by the external status API.
//!
//! `alerts.jsonl` carries the dashboard event log, rate-limited per category;
//! `trades.jsonl` carries finalized trade records. Both are plain files in
//! the data directory, one JSON object per line.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::Trade;
use crate::error::Result;
use crate::service::event::{EngineEvent, Severity};

/// One line in `alerts.jsonl`.
#[derive(Debug, Serialize)]
struct AlertLine {
    /// Unix epoch seconds, fractional.
    timestamp: f64,
    severity: Severity,
    category: String,
    message: String,
    data: serde_json::Value,
}

/// Writer for the alerts journal with per-category rate limiting.
pub struct AlertJournal {
    path: PathBuf,
    /// Minimum spacing between alerts of the same category.
    min_interval: Duration,
    last_by_category: Mutex<HashMap<&'static str, DateTime<Utc>>>,
}

impl AlertJournal {
    /// Default spacing: at most one alert per category per 10 seconds.
    const DEFAULT_INTERVAL_SECS: i64 = 10;

    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            min_interval: Duration::seconds(Self::DEFAULT_INTERVAL_SECS),
            last_by_category: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_interval(path: PathBuf, interval: Duration) -> Self {
        Self {
            path,
            min_interval: interval,
            last_by_category: Mutex::new(HashMap::new()),
        }
    }

    /// Append an alert for `event`, unless its category fired too recently.
    ///
    /// Returns whether a line was written.
    pub fn record(&self, event: &EngineEvent) -> Result<bool> {
        let now = event.at();
        {
            let mut last = self.last_by_category.lock();
            if let Some(&prev) = last.get(event.category()) {
                if now - prev < self.min_interval {
                    return Ok(false);
                }
            }
            last.insert(event.category(), now);
        }

        let line = AlertLine {
            timestamp: epoch_secs(now),
            severity: event.severity(),
            category: event.category().to_string(),
            message: event.message(),
            data: event.context(),
        };
        self.append(&line)?;
        Ok(true)
    }

    fn append(&self, line: &AlertLine) -> Result<()> {
        let json = serde_json::to_string(line)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }
}

/// Writer for the finalized-trade journal.
pub struct TradeJournal {
    path: PathBuf,
}

/// Journal line: the trade record plus an epoch timestamp for the
/// dashboard's daily P&L windowing.
#[derive(Debug, Serialize)]
struct TradeLine<'a> {
    timestamp: f64,
    #[serde(flatten)]
    trade: &'a Trade,
}

impl TradeJournal {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append a finalized trade. Records are immutable once written.
    pub fn record(&self, trade: &Trade, at: DateTime<Utc>) -> Result<()> {
        let line = TradeLine {
            timestamp: epoch_secs(at),
            trade,
        };
        let json = serde_json::to_string(&line)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }
}

fn epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, MarketId, Side};

    fn event_at(at: DateTime<Utc>) -> EngineEvent {
        EngineEvent::WindowOpened {
            asset: Asset::from("btc"),
            market_id: MarketId::from("m"),
            open_price: 65000.0,
            at,
        }
    }

    #[test]
    fn rate_limits_per_category() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::new(dir.path().join("alerts.jsonl"));

        let t0 = Utc::now();
        assert!(journal.record(&event_at(t0)).unwrap());
        assert!(!journal.record(&event_at(t0 + Duration::seconds(5))).unwrap());
        assert!(journal.record(&event_at(t0 + Duration::seconds(11))).unwrap());

        let content = std::fs::read_to_string(dir.path().join("alerts.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn different_categories_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::new(dir.path().join("alerts.jsonl"));

        let t0 = Utc::now();
        assert!(journal.record(&event_at(t0)).unwrap());
        let stale = EngineEvent::FeedStale {
            asset: Asset::from("btc"),
            feed: "spot".to_string(),
            age_ms: 6000,
            at: t0,
        };
        assert!(journal.record(&stale).unwrap());
    }

    #[test]
    fn alert_lines_carry_dashboard_fields() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::new(dir.path().join("alerts.jsonl"));
        journal.record(&event_at(Utc::now())).unwrap();

        let content = std::fs::read_to_string(dir.path().join("alerts.jsonl")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["category"], "window_open");
        assert!(parsed["timestamp"].is_number());
        assert!(parsed["message"].as_str().unwrap().contains("BTC"));
    }

    #[test]
    fn trade_journal_appends_finalized_records() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path().join("trades.jsonl"));

        let mut trade = Trade::submitted(
            MarketId::from("m"),
            Asset::from("btc"),
            Side::Yes,
            0.55,
            100.0,
            0.09,
            Utc::now(),
        );
        trade.settle(1.0);
        journal.record(&trade, Utc::now()).unwrap();

        let content = std::fs::read_to_string(dir.path().join("trades.jsonl")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["outcome"], "converged");
        assert!(parsed["timestamp"].is_number());
        assert!(parsed["pnl"].is_number());
    }
}
