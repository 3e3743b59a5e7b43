//! Application orchestration.
//!
//! Wires the channel topology together: the feed pump demultiplexes the
//! market stream onto latest-value boards, one runner task per asset drives
//! its window state machine, the emitter fans lifecycle events out to the
//! journals, and the status loop snapshots everything for the dashboard
//! every couple of seconds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::adapter::{PaperGateway, SimDiscovery, SimMarketStream};
use crate::app::state::AppState;
use crate::config::Config;
use crate::domain::{Asset, MarketId};
use crate::engine::{AssetRunner, BookBoard, PriceBoard, VolBoard};
use crate::error::Result;
use crate::port::{MarketDiscovery, MarketEvent, MarketStream, OrderGateway};
use crate::risk::RiskLedger;
use crate::service::emitter;
use crate::service::event::EngineEvent;
use crate::service::status::{DailyCap, Status, StatusWriter};
use crate::service::{AlertJournal, LogNotifier, NotifierRegistry, TradeJournal};

/// Status file cadence.
const STATUS_INTERVAL_SECS: u64 = 2;
/// Backoff between stream reconnect attempts.
const RECONNECT_DELAY_SECS: u64 = 2;

/// Main application struct.
pub struct App;

impl App {
    /// Run the engine until the surrounding task is cancelled.
    pub async fn run(config: Config) -> Result<()> {
        std::fs::create_dir_all(&config.data.dir)?;

        let assets: Vec<Asset> = config.discovery.assets.iter().map(Asset::new).collect();
        let ledger = Arc::new(RiskLedger::new(
            config.risk.seed_usd,
            config.risk_limits(),
            Utc::now(),
        ));
        let state = Arc::new(AppState::new());

        if config.execution.dry_run {
            info!("dry run: signals will be logged but no orders placed");
        }

        // Event fan-out to log + journals.
        let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(256);
        let mut notifiers = NotifierRegistry::new();
        notifiers.register(Box::new(LogNotifier));
        let _emitter = emitter::spawn(
            events_rx,
            notifiers,
            AlertJournal::new(config.data.dir.join("alerts.jsonl")),
            TradeJournal::new(config.data.dir.join("trades.jsonl")),
        );

        // Latest-value boards; superseded market data is never queued.
        let (price_tx, price_rx) = watch::channel(PriceBoard::new());
        let (vol_tx, vol_rx) = watch::channel(VolBoard::new());
        let (book_tx, book_rx) = watch::channel(BookBoard::new());
        let (subscribe_tx, subscribe_rx) = mpsc::channel::<(Asset, Vec<MarketId>)>(16);

        // Validation pinned feeds.source to "sim" and execution.gateway to
        // "paper"; production adapters plug in through the same ports.
        let stream = SimMarketStream::new(config.feeds.sim.clone(), assets.clone());
        spawn_feed_pump(
            Box::new(stream),
            price_tx,
            vol_tx,
            book_tx,
            subscribe_rx,
            state.clone(),
        );

        let discovery: Arc<dyn MarketDiscovery> =
            Arc::new(SimDiscovery::new(config.discovery.window_duration_secs));
        let gateway: Arc<dyn OrderGateway> = Arc::new(PaperGateway::default());

        for asset in &assets {
            let runner = AssetRunner {
                asset: asset.clone(),
                machine_cfg: config.machine_config(asset),
                runner_cfg: config.runner_config(),
                ledger: ledger.clone(),
                discovery: discovery.clone(),
                gateway: gateway.clone(),
                price_rx: price_rx.clone(),
                vol_rx: vol_rx.clone(),
                book_rx: book_rx.clone(),
                subscribe_tx: subscribe_tx.clone(),
                events_tx: events_tx.clone(),
                state: state.clone(),
                data_dir: config.data.dir.clone(),
            };
            tokio::spawn(runner.run());
        }
        drop(subscribe_tx);
        drop(events_tx);

        info!(
            assets = assets.len(),
            window_secs = config.discovery.window_duration_secs,
            "engine started"
        );

        // Status loop owns this task.
        let writer = StatusWriter::new(config.data.dir.join("status.json"));
        let mut interval = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let status = assemble_status(&state, &ledger, &price_rx, &vol_rx);
            if let Err(e) = writer.write(&status) {
                error!(error = %e, "failed to write status file");
            }
        }
    }
}

/// Build the full dashboard snapshot from the shared state and ledger.
fn assemble_status(
    state: &AppState,
    ledger: &RiskLedger,
    price_rx: &watch::Receiver<PriceBoard>,
    vol_rx: &watch::Receiver<VolBoard>,
) -> Status {
    let now = Utc::now();
    let snap = ledger.snapshot(now);

    let spot: HashMap<String, f64> = price_rx
        .borrow()
        .iter()
        .map(|(asset, tick)| (asset.to_string(), tick.price))
        .collect();
    let implied_vol: HashMap<String, f64> = vol_rx
        .borrow()
        .iter()
        .map(|(asset, vol)| (asset.to_string(), vol.implied_vol))
        .collect();

    Status {
        timestamp: now.timestamp_millis() as f64 / 1000.0,
        balance: snap.balance.to_f64().unwrap_or(0.0),
        seed: snap.seed.to_f64().unwrap_or(0.0),
        feeds: state.feed_statuses(),
        spot,
        implied_vol,
        current_windows: state.window_statuses(),
        trades: state.trade_summary(
            snap.open_positions as u64,
            snap.total_pnl.to_f64().unwrap_or(0.0),
            snap.session_pnl.to_f64().unwrap_or(0.0),
            snap.daily_pnl.to_f64().unwrap_or(0.0),
        ),
        recent_trades: state.recent_trades(),
        daily_cap: DailyCap {
            limit: snap.daily_cap_limit.to_f64().unwrap_or(0.0),
            used_pct: snap.daily_cap_used_pct,
        },
    }
}

/// Why the feed pump woke up.
enum Wake {
    Subscription(Option<(Asset, Vec<MarketId>)>),
    Market(Option<MarketEvent>),
}

/// Demultiplex the market stream onto the boards, reconnecting forever.
fn spawn_feed_pump(
    mut stream: Box<dyn MarketStream>,
    price_tx: watch::Sender<PriceBoard>,
    vol_tx: watch::Sender<VolBoard>,
    book_tx: watch::Sender<BookBoard>,
    mut subscribe_rx: mpsc::Receiver<(Asset, Vec<MarketId>)>,
    state: Arc<AppState>,
) {
    tokio::spawn(async move {
        let mut subs: HashMap<Asset, Vec<MarketId>> = HashMap::new();

        'reconnect: loop {
            if let Err(e) = stream.connect().await {
                warn!(stream = stream.name(), error = %e, "stream connect failed, retrying");
                sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                continue;
            }
            let wanted: Vec<MarketId> = subs.values().flatten().cloned().collect();
            if !wanted.is_empty() {
                if let Err(e) = stream.subscribe(&wanted).await {
                    warn!(error = %e, "resubscribe failed");
                }
            }

            loop {
                // Bind the wake reason first: the stream is mutably borrowed
                // by next_event, so handlers must run after the select ends.
                let wake = tokio::select! {
                    request = subscribe_rx.recv() => Wake::Subscription(request),
                    event = stream.next_event() => Wake::Market(event),
                };

                match wake {
                    Wake::Subscription(Some((asset, market_ids))) => {
                        subs.insert(asset, market_ids);
                        let wanted: Vec<MarketId> = subs.values().flatten().cloned().collect();
                        if let Err(e) = stream.subscribe(&wanted).await {
                            warn!(error = %e, "book subscription failed");
                        }
                    }
                    Wake::Subscription(None) => return,
                    Wake::Market(Some(event)) => {
                        apply_event(event, &price_tx, &vol_tx, &book_tx, &state);
                    }
                    Wake::Market(None) => {
                        warn!(stream = stream.name(), "market stream closed, reconnecting");
                        state.set_feed("spot", false, 0);
                        state.set_feed("vol", false, 0);
                        state.set_feed("book", false, 0);
                        sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                        continue 'reconnect;
                    }
                }
            }
        }
    });
}

fn apply_event(
    event: MarketEvent,
    price_tx: &watch::Sender<PriceBoard>,
    vol_tx: &watch::Sender<VolBoard>,
    book_tx: &watch::Sender<BookBoard>,
    state: &AppState,
) {
    match event {
        MarketEvent::SpotTick(tick) => {
            state.set_feed("spot", true, tick.source_latency_ms);
            price_tx.send_modify(|board| {
                board.insert(tick.asset.clone(), tick);
            });
        }
        MarketEvent::VolUpdate(vol) => {
            state.set_feed("vol", true, 0);
            vol_tx.send_modify(|board| {
                board.insert(vol.asset.clone(), vol);
            });
        }
        MarketEvent::BookUpdate { market_id, book } => {
            state.set_feed("book", true, 0);
            book_tx.send_modify(|board| {
                board.insert(market_id, book);
            });
        }
        MarketEvent::Connected { feed } => {
            state.set_feed(&feed, true, 0);
        }
        MarketEvent::Disconnected { feed, reason } => {
            warn!(feed = %feed, reason = %reason, "feed disconnected");
            state.set_feed(&feed, false, 0);
        }
    }
}
