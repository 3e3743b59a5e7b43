//! Per-asset async update loop.
//!
//! One runner task per tracked asset. Each loop is single-threaded: ticks,
//! book updates, order notifications, and timer events are processed
//! strictly in arrival order, with the latest-value boards guaranteeing that
//! superseded market data is never replayed. Cross-asset state is read-only
//! here except the risk ledger, which serializes internally.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration as TokioDuration, Instant};
use tracing::{debug, info, warn};

use crate::domain::{Asset, MarketBook, MarketId, Tick, VolSnapshot, WindowState};
use crate::engine::machine::{MachineConfig, Update, WindowMachine};
use crate::port::{MarketDiscovery, OrderGateway, OrderUpdate, Resolution};
use crate::risk::RiskLedger;
use crate::service::event::EngineEvent;

/// Latest tick per asset, published by the feed pump.
pub type PriceBoard = HashMap<Asset, Tick>;
/// Latest vol snapshot per asset.
pub type VolBoard = HashMap<Asset, VolSnapshot>;
/// Latest book per market.
pub type BookBoard = HashMap<MarketId, MarketBook>;

/// Runner pacing knobs, shared across assets.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Order submission and fill confirmation deadline.
    pub order_deadline_secs: u64,
    /// Backoff when discovery has nothing listed for the asset.
    pub discovery_retry_secs: u64,
    /// How long to poll for a venue resolution after the close.
    pub settle_grace_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            order_deadline_secs: 10,
            discovery_retry_secs: 15,
            settle_grace_secs: 5,
        }
    }
}

/// The per-asset update loop and its collaborators.
pub struct AssetRunner {
    pub asset: Asset,
    pub machine_cfg: MachineConfig,
    pub runner_cfg: RunnerConfig,
    pub ledger: Arc<RiskLedger>,
    pub discovery: Arc<dyn MarketDiscovery>,
    pub gateway: Arc<dyn OrderGateway>,
    pub price_rx: watch::Receiver<PriceBoard>,
    pub vol_rx: watch::Receiver<VolBoard>,
    pub book_rx: watch::Receiver<BookBoard>,
    /// Book subscription requests toward the feed pump.
    pub subscribe_tx: mpsc::Sender<(Asset, Vec<MarketId>)>,
    pub events_tx: mpsc::Sender<EngineEvent>,
    pub state: Arc<crate::app::AppState>,
    pub data_dir: PathBuf,
}

impl AssetRunner {
    /// Run window lifecycles for this asset until the process shuts down.
    pub async fn run(mut self) {
        let mut machine = WindowMachine::new(
            self.asset.clone(),
            self.machine_cfg.clone(),
            self.ledger.clone(),
        );
        let mut not_before = Utc::now();

        info!(asset = %self.asset, "asset lifecycle started");

        loop {
            if self.is_paused() {
                debug!(asset = %self.asset, "paused, skipping window");
                sleep(TokioDuration::from_secs(5)).await;
                continue;
            }

            let spec = match self.discovery.next_window(&self.asset, not_before).await {
                Ok(Some(spec)) => spec,
                Ok(None) => {
                    debug!(asset = %self.asset, "no window listed, retrying");
                    sleep(TokioDuration::from_secs(self.runner_cfg.discovery_retry_secs)).await;
                    continue;
                }
                Err(e) => {
                    warn!(asset = %self.asset, error = %e, "window discovery failed");
                    sleep(TokioDuration::from_secs(self.runner_cfg.discovery_retry_secs)).await;
                    continue;
                }
            };

            let market_id = spec.market_id.clone();
            let expires_at = spec.expires_at();

            if self
                .subscribe_tx
                .send((self.asset.clone(), vec![market_id.clone()]))
                .await
                .is_err()
            {
                warn!(asset = %self.asset, "subscription channel closed, stopping");
                return;
            }

            sleep_until_utc(spec.opens_at).await;

            let now = Utc::now();
            let spot = self.price_rx.borrow().get(&self.asset).cloned();
            let update = machine.open_window(spec, spot.as_ref(), now);
            self.publish(&mut machine, update, now).await;

            if machine.state() == WindowState::Idle {
                warn!(asset = %self.asset, "no spot price at window open, skipping");
                not_before = expires_at;
                continue;
            }

            self.monitor_window(&mut machine, &market_id, expires_at)
                .await;

            if machine.state() != WindowState::Settled {
                let resolution = self.await_resolution(&machine, &market_id).await;
                let now = Utc::now();
                let final_spot = self
                    .price_rx
                    .borrow()
                    .get(&self.asset)
                    .map(|tick| tick.price);
                let update = machine.on_expiry(resolution.as_ref(), final_spot, now);
                self.publish(&mut machine, update, now).await;
            }

            machine.reset();
            not_before = expires_at;
        }
    }

    /// Select over market data, order notifications, the order deadline, and
    /// window expiry until the window is over.
    async fn monitor_window(
        &mut self,
        machine: &mut WindowMachine,
        market_id: &MarketId,
        expires_at: DateTime<Utc>,
    ) {
        let (order_tx, mut order_rx) = mpsc::channel::<OrderUpdate>(16);
        let mut order_deadline: Option<Instant> = None;

        // Fresh receiver handles so the select arms don't contend over self.
        let mut price_rx = self.price_rx.clone();
        let mut vol_rx = self.vol_rx.clone();
        let mut book_rx = self.book_rx.clone();

        loop {
            if machine.state() == WindowState::Settled {
                return;
            }
            let now = Utc::now();
            if now >= expires_at {
                return;
            }

            let deadline_fires = deadline_future(order_deadline);
            tokio::select! {
                res = price_rx.changed() => {
                    if res.is_err() {
                        return;
                    }
                }
                res = vol_rx.changed() => {
                    if res.is_err() {
                        return;
                    }
                }
                res = book_rx.changed() => {
                    if res.is_err() {
                        return;
                    }
                }
                notice = order_rx.recv() => {
                    if let Some(notice) = notice {
                        let now = Utc::now();
                        let update = machine.on_order_update(notice, now);
                        self.publish(machine, update, now).await;
                        if machine.state() != WindowState::Executing {
                            order_deadline = None;
                        }
                    }
                    continue;
                }
                () = deadline_fires => {
                    let now = Utc::now();
                    let update =
                        machine.on_order_deadline(self.runner_cfg.order_deadline_secs, now);
                    self.publish(machine, update, now).await;
                    order_deadline = None;
                    continue;
                }
                () = sleep_until_utc(expires_at) => {
                    return;
                }
            }

            // One fused evaluation per wakeup, on the latest boards.
            let now = Utc::now();
            let tick = price_rx.borrow().get(&self.asset).cloned();
            let vol = vol_rx.borrow().get(&self.asset).cloned();
            let book = book_rx.borrow().get(market_id).copied();

            let update = machine.on_market_data(tick.as_ref(), vol.as_ref(), book.as_ref(), now);
            let order = update.order.clone();
            self.publish(machine, update, now).await;

            if let Some(order) = order {
                order_deadline = Some(
                    Instant::now()
                        + TokioDuration::from_secs(self.runner_cfg.order_deadline_secs),
                );
                if let Err(e) = self.gateway.submit(order.clone(), order_tx.clone()).await {
                    let now = Utc::now();
                    let update = machine.on_order_update(
                        OrderUpdate::Rejected {
                            trade_id: order.trade_id,
                            reason: e.to_string(),
                        },
                        now,
                    );
                    self.publish(machine, update, now).await;
                    order_deadline = None;
                }
            }
        }
    }

    /// Poll discovery for the venue's resolution, bounded by the grace
    /// period. Only worth waiting for when a position is actually held.
    async fn await_resolution(
        &self,
        machine: &WindowMachine,
        market_id: &MarketId,
    ) -> Option<Resolution> {
        if machine.state() != WindowState::Filled {
            return None;
        }
        let deadline = Instant::now() + TokioDuration::from_secs(self.runner_cfg.settle_grace_secs);
        loop {
            match self.discovery.resolution(market_id).await {
                Ok(Some(resolution)) => return Some(resolution),
                Ok(None) => {}
                Err(e) => {
                    warn!(asset = %self.asset, error = %e, "resolution lookup failed");
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(TokioDuration::from_secs(1)).await;
        }
    }

    /// Fan out machine output: events to the emitter, settled trades to the
    /// shared trade log, and the window snapshot to the status surface.
    async fn publish(&self, machine: &mut WindowMachine, update: Update, now: DateTime<Utc>) {
        for event in update.events {
            if self.events_tx.send(event).await.is_err() {
                debug!(asset = %self.asset, "event channel closed");
            }
        }
        if let Some(trade) = update.settled {
            self.state.record_settled(&trade);
        }
        if let Some(status) = machine.status(now) {
            self.state.set_window(&self.asset, status);
        }
    }

    fn is_paused(&self) -> bool {
        self.data_dir.join("pause.flag").exists()
    }
}

/// Sleep until a wall-clock timestamp; returns immediately if it has passed.
async fn sleep_until_utc(target: DateTime<Utc>) {
    let now = Utc::now();
    if target <= now {
        return;
    }
    let millis = (target - now).num_milliseconds().max(0) as u64;
    sleep(TokioDuration::from_millis(millis)).await;
}

/// Resolves when the order deadline fires; pends forever when none is armed.
async fn deadline_future(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
