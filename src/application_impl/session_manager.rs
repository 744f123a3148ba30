use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::session::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SIGNAL_QUEUE: usize = 32;

pub struct SessionManagerBuilder {
    storage: Arc<dyn KeyValueStore>,
    exchanger: Arc<dyn TokenExchanger>,
    clock: Arc<dyn Clock>,
    redirect: Arc<dyn LoginRedirect>,
    config: SessionConfig,
}

impl SessionManagerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<SessionManager, SessionError> {
        self.config.validate()?;
        let tokens = Arc::new(TokenStore::new(self.storage, self.clock));
        let refresh = SilentRefresh::new(tokens.clone(), self.exchanger);
        let core = Arc::new(SessionCore::new(tokens, refresh, self.redirect, self.config));
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE);
        Ok(SessionManager {
            core,
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            monitor_handle: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }
}

/// Owned session lifecycle manager. Construct one per application root and
/// drive it with [`SessionService::start`] / [`SessionService::destroy`].
pub struct SessionManager {
    core: Arc<SessionCore>,
    signal_tx: mpsc::Sender<EnvironmentSignal>,
    signal_rx: Mutex<Option<mpsc::Receiver<EnvironmentSignal>>>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl SessionManager {
    pub fn builder(
        storage: Arc<dyn KeyValueStore>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            storage,
            exchanger,
            clock: Arc::new(SystemClock),
            redirect: Arc::new(LogOnlyRedirect),
            config: SessionConfig::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.monitor_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(SessionError::Destroyed)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl SessionService for SessionManager {
    fn start(&self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let mut handle = self
            .monitor_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(signals) = self
            .signal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };
        let monitor = BackgroundMonitor::new(self.core.clone(), signals, self.core.shutdown_token());
        *handle = Some(tokio::spawn(monitor.run()));
        Ok(())
    }

    fn login(&self, tokens: TokenPair) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.core
            .install(&tokens.access_token, &tokens.refresh_token)?;
        tracing::info!("session tokens installed");
        Ok(())
    }

    fn logout(&self) -> Result<(), SessionError> {
        self.core.discard()?;
        tracing::info!("session tokens cleared on logout");
        Ok(())
    }

    fn session_status(&self) -> Result<SessionStatus, SessionError> {
        Ok(self.core.status()?)
    }

    fn access_token(&self) -> Result<Option<String>, SessionError> {
        let now = self.core.tokens.now();
        Ok(self
            .core
            .tokens
            .access_token()?
            .filter(|token| token.is_valid_at(now))
            .map(|token| token.value().to_string()))
    }

    async fn force_refresh(&self) -> bool {
        if self.ensure_alive().is_err() {
            return false;
        }
        self.core.refresh_now().await
    }

    async fn on_unauthorized(&self) -> bool {
        tracing::info!("access token rejected by backend, refreshing");
        self.force_refresh().await
    }

    fn config(&self) -> SessionConfig {
        self.core.config()
    }

    fn update_config(&self, patch: SessionConfigPatch) -> Result<SessionConfig, SessionError> {
        self.ensure_alive()?;
        let merged = self.core.config().merged(patch);
        merged.validate()?;
        self.core.set_config(merged.clone());
        tracing::info!(config = ?merged, "session config updated");
        Ok(merged)
    }

    fn subscribe(&self, listener: SessionListener) -> ListenerId {
        self.core.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.core.notifier.unsubscribe(id)
    }

    fn signals(&self) -> SignalSender {
        SignalSender::new(self.signal_tx.clone())
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("session manager shutting down...");

        self.core.shutdown();
        self.core.notifier.clear();
        drop(
            self.signal_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handle = self
            .monitor_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let r = handle.await;
            tracing::info!("monitor handle dropped: {:?}", r);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
