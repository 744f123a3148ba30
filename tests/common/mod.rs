#![allow(dead_code)]

use campus_session::application_impl::SessionManager;
use campus_session::application_port::SessionService;
use campus_session::domain_model::{SessionConfig, SessionEvent, TokenPair};
use campus_session::domain_port::{Clock, KeyValueStore, LoginRedirect, ManualClock};
use campus_session::infra_exchange::{FakeTokenExchanger, fake_access_token};
use campus_session::infra_store::MemoryStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct RecordingRedirect {
    pub routes: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub clock: Arc<ManualClock>,
    pub fake: Arc<FakeTokenExchanger>,
    pub store: Arc<dyn KeyValueStore>,
    pub events: Arc<Mutex<Vec<SessionEvent>>>,
    pub redirect: Arc<RecordingRedirect>,
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_800_000_000, 0).unwrap()
}

/// Config with no delays so paused-time tests stay short.
pub fn quick_config() -> SessionConfig {
    SessionConfig {
        refresh_threshold: Duration::from_secs(300),
        check_interval: Duration::from_secs(60),
        max_retries: 3,
        retry_delay: Duration::ZERO,
        redirect_grace: Duration::from_millis(500),
        ..Default::default()
    }
}

impl Harness {
    pub fn new(
        config: SessionConfig,
        exchanger: impl FnOnce(Arc<dyn Clock>) -> FakeTokenExchanger,
    ) -> Self {
        Self::on_store(Arc::new(MemoryStore::new()), config, exchanger)
    }

    pub fn on_store(
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
        exchanger: impl FnOnce(Arc<dyn Clock>) -> FakeTokenExchanger,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let fake = Arc::new(exchanger(shared_clock));
        let redirect = Arc::new(RecordingRedirect::default());
        let manager = SessionManager::builder(store.clone(), fake.clone())
            .clock(clock.clone())
            .redirect(redirect.clone())
            .config(config)
            .build()
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        manager.subscribe(Arc::new(move |event: &SessionEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        Self {
            manager,
            clock,
            fake,
            store,
            events,
            redirect,
        }
    }

    pub fn token_expiring_in(&self, secs: i64) -> String {
        let now = self.clock.now();
        fake_access_token(now, now + chrono::Duration::seconds(secs))
    }

    pub fn login_expiring_in(&self, secs: i64) {
        self.manager
            .login(TokenPair {
                access_token: self.token_expiring_in(secs),
                refresh_token: "refresh-0".to_string(),
            })
            .unwrap();
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn expired_events(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::SessionExpired { .. }))
            .count()
    }

    pub fn refreshed_events(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::TokenRefreshed { .. }))
            .count()
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap()
    }
}

/// Lets spawned tasks run; with paused time this also fires due timers.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
