use crate::domain_model::{EnvironmentSignal, SessionConfig};
use crate::domain_port::{StorageChange, StorageWatcher};
use crate::session::{SessionCore, is_token_key};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle through which the host reports visibility, connectivity and
/// storage events. Signals sent after the monitor stopped are dropped.
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<EnvironmentSignal>,
}

impl SignalSender {
    pub(crate) fn new(tx: mpsc::Sender<EnvironmentSignal>) -> Self {
        Self { tx }
    }

    pub fn notify(&self, signal: EnvironmentSignal) {
        if let Err(e) = self.tx.try_send(signal) {
            tracing::debug!(?signal, "environment signal dropped: {e}");
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_change(watcher: &mut Option<StorageWatcher>) -> Option<StorageChange> {
    match watcher {
        Some(w) => w.changed().await,
        None => std::future::pending().await,
    }
}

/// Decides when to refresh, independent of any caller. Runs until `cancel` fires.
pub struct BackgroundMonitor {
    core: Arc<SessionCore>,
    signals: mpsc::Receiver<EnvironmentSignal>,
    config: watch::Receiver<SessionConfig>,
    storage: Option<StorageWatcher>,
    cancel: CancellationToken,
}

impl BackgroundMonitor {
    pub fn new(
        core: Arc<SessionCore>,
        signals: mpsc::Receiver<EnvironmentSignal>,
        cancel: CancellationToken,
    ) -> Self {
        let config = core.subscribe_config();
        let storage = core.tokens.watch();
        Self {
            core,
            signals,
            config,
            storage,
            cancel,
        }
    }

    pub async fn run(mut self) {
        let mut interval = ticker(self.config.borrow_and_update().check_interval);
        tracing::info!(period = ?interval.period(), "session monitor started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("session monitor shutting down...");
                    break;
                }
                changed = self.config.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = self.config.borrow_and_update().check_interval;
                    tracing::info!(?period, "session monitor cadence updated");
                    interval = ticker(period);
                }
                Some(signal) = self.signals.recv() => {
                    self.core.handle_signal(signal);
                }
                change = next_change(&mut self.storage) => match change {
                    Some(StorageChange { key: Some(key), .. }) if !is_token_key(&key) => {}
                    Some(_) => self.core.handle_signal(EnvironmentSignal::StorageChanged),
                    None => self.storage = None,
                },
                _ = interval.tick() => {
                    self.core.check_and_maybe_refresh();
                }
            }
        }
    }
}
