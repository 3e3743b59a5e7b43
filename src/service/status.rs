//! Status snapshot file for the external monitoring dashboard.
//!
//! Written every couple of seconds to `status.json` in the data directory.
//! The dashboard polls it read-only; the engine never accepts commands
//! through this surface.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Trade;
use crate::error::Result;

/// Per-feed health as shown in the dashboard header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedStatus {
    pub name: String,
    pub connected: bool,
    pub latency_ms: u64,
}

/// Per-asset window snapshot, one entry per live window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStatus {
    pub asset: String,
    pub market_id: String,
    pub state: String,
    pub open_price: f64,
    pub current_move_pct: f64,
    pub time_remaining_sec: f64,
    pub fair_yes: f64,
    pub fair_no: f64,
    pub clob_yes_mid: f64,
    pub clob_no_mid: f64,
    pub edge_yes: f64,
    pub edge_no: f64,
    pub divergence_open: bool,
    /// Unix epoch seconds when the open episode started, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence_since: Option<f64>,
}

/// Aggregate trade counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeSummary {
    pub wins: u64,
    pub losses: u64,
    pub open: u64,
    pub total_pnl: f64,
    pub session_pnl: f64,
    pub daily_pnl: f64,
    pub avg_edge: f64,
    pub avg_latency_ms: f64,
}

/// Daily loss cap state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyCap {
    pub limit: f64,
    pub used_pct: f64,
}

/// Top-level status snapshot, the full dashboard contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Unix epoch seconds, fractional.
    pub timestamp: f64,
    pub balance: f64,
    pub seed: f64,
    pub feeds: Vec<FeedStatus>,
    /// Latest spot per asset.
    pub spot: HashMap<String, f64>,
    /// Latest implied vol per asset.
    pub implied_vol: HashMap<String, f64>,
    pub current_windows: Vec<WindowStatus>,
    pub trades: TradeSummary,
    pub recent_trades: Vec<Trade>,
    pub daily_cap: DailyCap,
}

impl Status {
    #[must_use]
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.timestamp_millis() as f64 / 1000.0,
            balance: 0.0,
            seed: 0.0,
            feeds: Vec::new(),
            spot: HashMap::new(),
            implied_vol: HashMap::new(),
            current_windows: Vec::new(),
            trades: TradeSummary::default(),
            recent_trades: Vec::new(),
            daily_cap: DailyCap::default(),
        }
    }
}

/// Writer for the status file.
///
/// Uses write-to-temp-then-rename so the dashboard never observes a torn
/// snapshot.
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn write(&self, status: &Status) -> Result<()> {
        let json = serde_json::to_string(status)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let writer = StatusWriter::new(path.clone());

        let mut status = Status::empty(Utc::now());
        status.balance = 1044.5;
        status.seed = 1000.0;
        status.spot.insert("btc".to_string(), 65200.0);
        status.daily_cap = DailyCap {
            limit: 200.0,
            used_pct: 0.25,
        };
        writer.write(&status).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Status = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.balance, 1044.5);
        assert_eq!(parsed.spot["btc"], 65200.0);
        assert_eq!(parsed.daily_cap.limit, 200.0);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let writer = StatusWriter::new(path.clone());

        writer.write(&Status::empty(Utc::now())).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn window_status_serializes_dashboard_fields() {
        let ws = WindowStatus {
            asset: "btc".to_string(),
            market_id: "btc-updown-5m-0".to_string(),
            state: "divergence".to_string(),
            open_price: 65000.0,
            current_move_pct: 0.0031,
            time_remaining_sec: 112.0,
            fair_yes: 0.93,
            fair_no: 0.07,
            clob_yes_mid: 0.5,
            clob_no_mid: 0.5,
            edge_yes: 0.43,
            edge_no: -0.43,
            divergence_open: true,
            divergence_since: Some(1_700_000_000.0),
        };
        let json = serde_json::to_value(&ws).unwrap();
        assert_eq!(json["state"], "divergence");
        assert_eq!(json["divergence_open"], true);
        assert!(json["edge_yes"].as_f64().unwrap() > 0.0);
    }
}
