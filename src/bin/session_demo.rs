//! Two "tabs" sharing one store and one token endpoint.
//!
//! $ cargo run --bin session_demo

use campus_session::application_impl::SessionManager;
use campus_session::application_port::SessionService;
use campus_session::domain_model::{EnvironmentSignal, SessionConfig, SessionEvent, TokenPair};
use campus_session::domain_port::{Clock, SystemClock};
use campus_session::infra_exchange::{FakeTokenExchanger, fake_access_token};
use campus_session::infra_store::MemoryStore;
use campus_session::logger::*;
use std::sync::Arc;
use std::time::Duration;

fn tab(
    name: &'static str,
    store: MemoryStore,
    exchanger: Arc<FakeTokenExchanger>,
) -> anyhow::Result<SessionManager> {
    let manager = SessionManager::builder(Arc::new(store), exchanger)
        .config(SessionConfig {
            refresh_threshold: Duration::from_secs(5),
            check_interval: Duration::from_secs(1),
            retry_delay: Duration::from_millis(200),
            ..Default::default()
        })
        .build()?;
    manager.subscribe(Arc::new(move |event: &SessionEvent| {
        info!(tab = name, event = event.name(), "observed");
    }));
    Ok(manager)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::new_bootstrap();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let exchanger = Arc::new(
        FakeTokenExchanger::new(clock.clone())
            .with_latency(Duration::from_millis(300))
            .with_lifetime(chrono::Duration::seconds(30)),
    );

    let shared = MemoryStore::new();
    let first = tab("first", shared.handle(), exchanger.clone())?;
    let second = tab("second", shared.handle(), exchanger.clone())?;

    let now = clock.now();
    first.login(TokenPair {
        access_token: fake_access_token(now, now + chrono::Duration::seconds(8)),
        refresh_token: "demo-refresh".to_string(),
    })?;

    first.start()?;
    second.start()?;

    tokio::time::sleep(Duration::from_secs(6)).await;
    info!(exchanges = exchanger.calls(), "after proactive refresh");

    second.signals().notify(EnvironmentSignal::Offline);
    second.signals().notify(EnvironmentSignal::Online);
    second.signals().notify(EnvironmentSignal::Foregrounded);
    let forced = second.force_refresh().await;
    info!(forced, status = ?second.session_status()?, "second tab");

    first.destroy().await;
    second.destroy().await;
    second.destroy().await;
    info!(exchanges = exchanger.calls(), "done");
    Ok(())
}
