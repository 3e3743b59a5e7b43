//! End-to-end dry run: the full task topology against the sim adapters.
//!
//! Spins up the whole engine with 2-second windows and asserts the external
//! contract: a parseable status file and a populated alerts journal.

use std::time::Duration;

use windvane::config::{
    Config, DataConfig, DiscoveryConfig, ExecutionConfig, FeedsConfig, LoggingConfig, RiskConfig,
    SimFeedConfig, StrategyConfig,
};
use windvane::service::Status;

fn fast_config(data_dir: std::path::PathBuf) -> Config {
    Config {
        discovery: DiscoveryConfig {
            assets: vec!["btc".to_string()],
            window_duration_secs: 2,
            retry_secs: 1,
            settle_grace_secs: 1,
        },
        strategy: StrategyConfig::default(),
        risk: RiskConfig::default(),
        feeds: FeedsConfig {
            source: "sim".to_string(),
            sim: SimFeedConfig {
                tick_interval_ms: 50,
                ..SimFeedConfig::default()
            },
        },
        execution: ExecutionConfig::default(),
        data: DataConfig { dir: data_dir },
        logging: LoggingConfig::default(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_produces_status_and_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let config = fast_config(data_dir.clone());

    let engine = tokio::spawn(windvane::app::App::run(config));

    // Wait for at least one full window lifecycle to hit the journals.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    let alerts_path = data_dir.join("alerts.jsonl");
    let status_path = data_dir.join("status.json");

    let mut saw_window_open = false;
    while tokio::time::Instant::now() < deadline {
        if let Ok(content) = std::fs::read_to_string(&alerts_path) {
            if content.contains("\"window_open\"") {
                saw_window_open = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert!(saw_window_open, "no window_open alert within the deadline");

    // The status file must exist and parse into the dashboard contract.
    let mut parsed: Option<Status> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if let Ok(content) = std::fs::read_to_string(&status_path) {
            if let Ok(status) = serde_json::from_str::<Status>(&content) {
                if !status.current_windows.is_empty() {
                    parsed = Some(status);
                    break;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    let status = parsed.expect("status file with a window snapshot");

    assert_eq!(status.seed, 1000.0);
    assert_eq!(status.balance, 1000.0, "dry run must not move the balance");
    assert_eq!(status.daily_cap.limit, 200.0);
    let window = &status.current_windows[0];
    assert_eq!(window.asset, "btc");
    assert!(window.open_price > 0.0);
    assert!(!status.spot.is_empty());

    engine.abort();
}
