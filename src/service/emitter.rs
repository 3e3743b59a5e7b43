//! Event fan-out: structured log lines, alert journal, trade journal.
//!
//! The emitter drains the engine's event channel on its own task so nothing
//! on the hot tick path ever waits on file I/O.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::service::event::{EngineEvent, Severity};
use crate::service::journal::{AlertJournal, TradeJournal};

/// Sink for engine lifecycle events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &EngineEvent);
}

/// Notifier that writes structured tracing lines.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &EngineEvent) {
        match event.severity() {
            Severity::Info => info!(
                category = event.category(),
                context = %event.context(),
                "{}",
                event.message()
            ),
            Severity::Warning => warn!(
                category = event.category(),
                context = %event.context(),
                "{}",
                event.message()
            ),
            Severity::Critical => error!(
                category = event.category(),
                context = %event.context(),
                "{}",
                event.message()
            ),
        }
    }
}

/// Registry of notifiers, all invoked per event.
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn notify_all(&self, event: &EngineEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event);
        }
    }
}

/// Spawn the emitter task: drains `events`, fans out to notifiers and
/// journals until the channel closes.
pub fn spawn(
    mut events: mpsc::Receiver<EngineEvent>,
    notifiers: NotifierRegistry,
    alerts: AlertJournal,
    trades: TradeJournal,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            notifiers.notify_all(&event);

            if let Err(e) = alerts.record(&event) {
                error!(error = %e, "failed to append alert");
            }

            if let Some(trade) = event.settled_trade() {
                if let Err(e) = trades.record(trade, event.at()) {
                    error!(error = %e, trade_id = %trade.id, "failed to journal trade");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, MarketId};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingNotifier(Arc<AtomicUsize>);

    impl Notifier for CountingNotifier {
        fn notify(&self, _event: &EngineEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_fans_out_to_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(CountingNotifier(count.clone())));
        registry.register(Box::new(CountingNotifier(count.clone())));
        assert_eq!(registry.len(), 2);

        registry.notify_all(&EngineEvent::WindowOpened {
            asset: Asset::from("btc"),
            market_id: MarketId::from("m"),
            open_price: 65000.0,
            at: Utc::now(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn emitter_journals_settled_trades() {
        use crate::domain::{Side, Trade};

        let dir = tempfile::tempdir().unwrap();
        let alerts = AlertJournal::new(dir.path().join("alerts.jsonl"));
        let trades = TradeJournal::new(dir.path().join("trades.jsonl"));
        let (tx, rx) = mpsc::channel(8);

        let handle = spawn(rx, NotifierRegistry::new(), alerts, trades);

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
        tx.send(EngineEvent::Converged {
            trade,
            at: Utc::now(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let trades_content = std::fs::read_to_string(dir.path().join("trades.jsonl")).unwrap();
        assert_eq!(trades_content.lines().count(), 1);
        let alerts_content = std::fs::read_to_string(dir.path().join("alerts.jsonl")).unwrap();
        assert_eq!(alerts_content.lines().count(), 1);
    }
}
