use crate::domain_model::{EnvironmentSignal, ExpiryReason, SessionConfig, SessionEvent, SessionStatus};
use crate::domain_port::{LoginRedirect, StorageError};
use crate::session::{EventNotifier, RefreshError, SilentRefresh, TokenStore};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Outcome of a refresh cycle, awaitable by every caller that joined it.
pub type RefreshOutcome = Shared<BoxFuture<'static, bool>>;

struct InFlight {
    id: u64,
    outcome: RefreshOutcome,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RefreshState {
    inflight: Option<InFlight>,
    retry_count: u32,
    pending_redirect: Option<CancellationToken>,
}

/// Shared state of one session: owns the token store and runs refresh cycles.
///
/// A cycle is a spawned task that performs attempts until one succeeds, the
/// attempt budget is spent, or it is cancelled. At most one cycle exists at a time;
/// anyone asking for a refresh while one runs gets a handle on that cycle.
pub struct SessionCore {
    pub(crate) tokens: Arc<TokenStore>,
    pub(crate) notifier: EventNotifier,
    refresh: SilentRefresh,
    redirect: Arc<dyn LoginRedirect>,
    config: watch::Sender<SessionConfig>,
    state: Mutex<RefreshState>,
    online: AtomicBool,
    next_cycle: AtomicU64,
    shutdown: CancellationToken,
}

impl SessionCore {
    pub fn new(
        tokens: Arc<TokenStore>,
        refresh: SilentRefresh,
        redirect: Arc<dyn LoginRedirect>,
        config: SessionConfig,
    ) -> Self {
        let (config, _) = watch::channel(config);
        Self {
            tokens,
            notifier: EventNotifier::new(),
            refresh,
            redirect,
            config,
            state: Mutex::new(RefreshState::default()),
            online: AtomicBool::new(true),
            next_cycle: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> SessionConfig {
        self.config.borrow().clone()
    }

    pub fn set_config(&self, config: SessionConfig) {
        self.config.send_replace(config);
    }

    pub fn subscribe_config(&self) -> watch::Receiver<SessionConfig> {
        self.config.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().inflight.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.state().retry_count
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Result<SessionStatus, StorageError> {
        let (is_refreshing, retry_count) = {
            let state = self.state();
            (state.inflight.is_some(), state.retry_count)
        };
        Ok(SessionStatus {
            is_valid: self.tokens.is_valid()?,
            time_until_expiry: self.tokens.time_until_expiry()?,
            is_refreshing,
            retry_count,
        })
    }

    /// Stores a freshly issued pair and starts the session over.
    pub fn install(&self, access: &str, refresh: &str) -> Result<(), StorageError> {
        self.cancel_inflight();
        self.cancel_pending_redirect();
        self.tokens.replace(access, Some(refresh))?;
        self.state().retry_count = 0;
        self.warn_if_threshold_exceeds_lifetime();
        Ok(())
    }

    /// Drops the session on explicit logout. No expiry event, no redirect.
    pub fn discard(&self) -> Result<(), StorageError> {
        self.cancel_inflight();
        self.cancel_pending_redirect();
        self.state().retry_count = 0;
        self.tokens.clear()
    }

    /// Starts a cycle unless one is already running, in which case that one is returned.
    pub fn refresh_now(self: &Arc<Self>) -> RefreshOutcome {
        let mut state = self.state();
        if let Some(inflight) = &state.inflight {
            tracing::debug!(cycle = inflight.id, "joining in-flight refresh");
            return inflight.outcome.clone();
        }
        if self.shutdown.is_cancelled() {
            return futures_util::future::ready(false).boxed().shared();
        }

        let id = self.next_cycle.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let core = self.clone();
        let cycle_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let refreshed = core.run_cycle(id, &cycle_cancel).await;
            core.finish(id);
            refreshed
        });
        let outcome = handle.map(|joined| joined.unwrap_or(false)).boxed().shared();

        state.inflight = Some(InFlight {
            id,
            outcome: outcome.clone(),
            cancel,
        });
        outcome
    }

    /// Refreshes if a valid token is within the threshold of its expiry.
    pub fn check_and_maybe_refresh(self: &Arc<Self>) -> Option<RefreshOutcome> {
        if !self.is_online() {
            tracing::trace!("offline, skipping token check");
            return None;
        }
        if self.is_refreshing() {
            return None;
        }
        let token = match self.tokens.access_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("token storage unreadable: {e}");
                return None;
            }
        };
        let now = self.tokens.now();
        if !token.is_valid_at(now) {
            return None;
        }
        let remaining = token.remaining_at(now);
        let threshold = self.config.borrow().refresh_threshold;
        if remaining > threshold {
            tracing::trace!(?remaining, "token fresh enough");
            return None;
        }
        tracing::info!(?remaining, ?threshold, "token close to expiry, refreshing");
        Some(self.refresh_now())
    }

    pub fn handle_signal(self: &Arc<Self>, signal: EnvironmentSignal) {
        tracing::debug!(?signal, "environment signal");
        match signal {
            EnvironmentSignal::Offline => {
                self.online.store(false, Ordering::SeqCst);
                self.cancel_inflight();
            }
            EnvironmentSignal::Online => {
                self.online.store(true, Ordering::SeqCst);
                self.check_and_maybe_refresh();
            }
            EnvironmentSignal::Foregrounded | EnvironmentSignal::StorageChanged => {
                self.check_and_maybe_refresh();
            }
        }
    }

    /// Abandons the running cycle; its joiners resolve to `false` and the
    /// retry count starts over with the next cycle.
    pub fn cancel_inflight(&self) {
        let mut state = self.state();
        if let Some(inflight) = state.inflight.take() {
            tracing::info!(cycle = inflight.id, "cancelling in-flight refresh");
            state.retry_count = 0;
            inflight.cancel.cancel();
        }
    }

    fn cancel_pending_redirect(&self) {
        if let Some(pending) = self.state().pending_redirect.take() {
            tracing::debug!("login redirect withdrawn");
            pending.cancel();
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.cancel_inflight();
    }

    fn finish(&self, id: u64) {
        let mut state = self.state();
        if state.inflight.as_ref().is_some_and(|f| f.id == id) {
            state.inflight = None;
        }
    }

    async fn run_cycle(&self, id: u64, cancel: &CancellationToken) -> bool {
        let config = self.config();
        let budget = config.attempt_budget();
        let mut failures: u32 = 0;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                attempt = self.refresh.attempt(config.attempt_timeout, cancel) => attempt,
            };

            match attempt {
                Err(RefreshError::Cancelled) => return false,
                Ok(_) if cancel.is_cancelled() => return false,
                Ok(token) => {
                    self.state().retry_count = 0;
                    tracing::info!(cycle = id, expires_at = ?token.expires_at(), "access token refreshed");
                    self.warn_if_threshold_exceeds_lifetime();
                    self.notifier.emit(&SessionEvent::TokenRefreshed {
                        at: self.tokens.now(),
                    });
                    return true;
                }
                Err(e) if e.is_terminal() => {
                    tracing::warn!(cycle = id, "refresh impossible: {e}");
                    self.expire(ExpiryReason::NoRefreshToken);
                    return false;
                }
                Err(e) => {
                    failures += 1;
                    self.state().retry_count = failures.min(config.max_retries);
                    if failures >= budget {
                        tracing::warn!(cycle = id, failures, "refresh retries exhausted: {e}");
                        self.expire(ExpiryReason::RetriesExhausted);
                        return false;
                    }
                    let delay = config.backoff.delay(config.retry_delay, failures);
                    tracing::warn!(
                        cycle = id,
                        attempt = failures,
                        budget,
                        ?delay,
                        "token refresh failed, retrying: {e}"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn expire(&self, reason: ExpiryReason) {
        if let Err(e) = self.tokens.clear() {
            tracing::error!("failed to clear tokens on expiry: {e}");
        }
        self.notifier.emit(&SessionEvent::SessionExpired {
            at: self.tokens.now(),
            reason,
        });

        let config = self.config();
        let redirect = self.redirect.clone();
        let withdrawn = self.shutdown.child_token();
        if let Some(previous) = self.state().pending_redirect.replace(withdrawn.clone()) {
            previous.cancel();
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = withdrawn.cancelled() => {}
                _ = tokio::time::sleep(config.redirect_grace) => redirect.redirect(&config.login_route),
            }
        });
    }

    fn warn_if_threshold_exceeds_lifetime(&self) {
        let threshold = self.config.borrow().refresh_threshold;
        match self.tokens.time_until_expiry() {
            Ok(lifetime) if lifetime <= threshold => tracing::warn!(
                ?lifetime,
                ?threshold,
                "refresh threshold is not below the token lifetime, every check will refresh"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("token storage unreadable: {e}"),
        }
    }
}
