use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::SessionEvent;
use crate::domain_port::*;
use crate::infra_exchange::*;
use crate::infra_store::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

/// Wires the session manager from settings, the way the binary runs it.
pub struct App {
    pub session: Arc<dyn SessionService>,
}

impl App {
    pub fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let config = settings.session.to_config()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let storage: Arc<dyn KeyValueStore> = match settings.storage.backend.as_str() {
            "memory" => Arc::new(MemoryStore::new()),
            "file" => Arc::new(
                FileStore::new(&settings.storage.path)
                    .with_poll_interval(Duration::from_millis(settings.storage.poll_interval_ms)),
            ),
            other => return Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        };

        let exchanger: Arc<dyn TokenExchanger> = match settings.endpoint.backend.as_str() {
            "fake" => Arc::new(FakeTokenExchanger::new(clock.clone())),
            "http" => Arc::new(HttpTokenExchanger::new(
                settings.endpoint.token_url.clone(),
                Duration::from_millis(settings.endpoint.request_timeout_ms),
            )?),
            other => return Err(anyhow::anyhow!("Unknown endpoint backend: {}", other)),
        };

        let manager = SessionManager::builder(storage, exchanger)
            .clock(clock)
            .config(config)
            .build()?;
        let session: Arc<dyn SessionService> = Arc::new(manager);

        session.subscribe(Arc::new(|event: &SessionEvent| match event {
            SessionEvent::TokenRefreshed { at } => info!(%at, "token-refreshed"),
            SessionEvent::SessionExpired { at, reason } => warn!(%at, ?reason, "session-expired"),
        }));

        Ok(Self { session })
    }

    pub async fn shutdown(&self) {
        info!("app shutting down...");
        self.session.destroy().await;
    }
}
