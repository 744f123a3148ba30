use rand::Rng;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("check interval must be greater than zero")]
    ZeroCheckInterval,
    #[error("attempt timeout must be greater than zero")]
    ZeroAttemptTimeout,
    #[error("exponential backoff cap {max_delay:?} is below the base delay {base:?}")]
    BackoffCapBelowBase { base: Duration, max_delay: Duration },
}

/// How the delay between refresh attempts evolves within one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    Fixed,
    Exponential { max_delay: Duration, jitter: bool },
}

impl BackoffStrategy {
    /// Delay before the next attempt, given how many attempts already failed (>= 1).
    pub fn delay(&self, base: Duration, failures: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential { max_delay, jitter } => {
                let shift = failures.saturating_sub(1).min(16);
                let grown = base.saturating_mul(1u32 << shift).min(*max_delay);
                if *jitter && !grown.is_zero() {
                    let millis = grown.as_millis() as u64;
                    let spread = rand::thread_rng().gen_range(0..=millis / 2);
                    Duration::from_millis(millis - millis / 4 + spread / 2).min(*max_delay)
                } else {
                    grown
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Refresh once the access token has this much time left or less.
    pub refresh_threshold: Duration,
    pub check_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: BackoffStrategy,
    /// Pause between the expiry notification and the login redirect.
    pub redirect_grace: Duration,
    /// Upper bound on a single exchange round trip.
    pub attempt_timeout: Duration,
    pub login_route: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(300),
            check_interval: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            backoff: BackoffStrategy::Fixed,
            redirect_grace: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(15),
            login_route: "/login".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroCheckInterval);
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroAttemptTimeout);
        }
        if let BackoffStrategy::Exponential { max_delay, .. } = &self.backoff {
            if *max_delay < self.retry_delay {
                return Err(ConfigError::BackoffCapBelowBase {
                    base: self.retry_delay,
                    max_delay: *max_delay,
                });
            }
        }
        Ok(())
    }

    /// Number of exchange attempts one refresh cycle may spend.
    pub fn attempt_budget(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn merged(&self, patch: SessionConfigPatch) -> Self {
        Self {
            refresh_threshold: patch.refresh_threshold.unwrap_or(self.refresh_threshold),
            check_interval: patch.check_interval.unwrap_or(self.check_interval),
            max_retries: patch.max_retries.unwrap_or(self.max_retries),
            retry_delay: patch.retry_delay.unwrap_or(self.retry_delay),
            backoff: patch.backoff.unwrap_or_else(|| self.backoff.clone()),
            redirect_grace: patch.redirect_grace.unwrap_or(self.redirect_grace),
            attempt_timeout: patch.attempt_timeout.unwrap_or(self.attempt_timeout),
            login_route: patch.login_route.unwrap_or_else(|| self.login_route.clone()),
        }
    }
}

/// Partial update for [`SessionConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigPatch {
    pub refresh_threshold: Option<Duration>,
    pub check_interval: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub backoff: Option<BackoffStrategy>,
    pub redirect_grace: Option<Duration>,
    pub attempt_timeout: Option<Duration>,
    pub login_route: Option<String>,
}
