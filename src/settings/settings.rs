use crate::domain_model::{BackoffStrategy, SessionConfig};
use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub session: Session,
    pub endpoint: Endpoint,
    pub storage: Storage,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub refresh_threshold_secs: u64,
    pub check_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: String, // "fixed" or "exponential"
    #[serde(default)]
    pub backoff_max_delay_ms: Option<u64>,
    #[serde(default)]
    pub backoff_jitter: bool,
    pub redirect_grace_ms: u64,
    pub attempt_timeout_ms: u64,
    pub login_route: String,
}

#[derive(Debug, Deserialize)]
pub struct Endpoint {
    pub backend: String, // "fake" or "http"
    pub token_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: String, // "memory" or "file"
    pub path: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_backoff() -> String {
    "fixed".to_string()
}

impl Session {
    pub fn to_config(&self) -> Result<SessionConfig> {
        let retry_delay = Duration::from_millis(self.retry_delay_ms);
        let backoff = match self.backoff.as_str() {
            "fixed" => BackoffStrategy::Fixed,
            "exponential" => BackoffStrategy::Exponential {
                max_delay: self
                    .backoff_max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(retry_delay.saturating_mul(16)),
                jitter: self.backoff_jitter,
            },
            other => return Err(anyhow!("Unknown backoff strategy: {}", other)),
        };
        let config = SessionConfig {
            refresh_threshold: Duration::from_secs(self.refresh_threshold_secs),
            check_interval: Duration::from_millis(self.check_interval_ms),
            max_retries: self.max_retries,
            retry_delay,
            backoff,
            redirect_grace: Duration::from_millis(self.redirect_grace_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            login_route: self.login_route.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Loads the settings file, then applies `CAMPUS_SESSION__SECTION__KEY` overrides.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("CAMPUS_SESSION").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[session]
refresh_threshold_secs = 300
check_interval_ms = 60000
max_retries = 3
retry_delay_ms = 2000
backoff = "exponential"
backoff_max_delay_ms = 30000
redirect_grace_ms = 1000
attempt_timeout_ms = 15000
login_route = "/login"

[endpoint]
backend = "http"
token_url = "http://127.0.0.1:8000/api/token/refresh/"
request_timeout_ms = 10000

[storage]
backend = "file"
path = "var/session.json"
poll_interval_ms = 250

[log]
filter = "info"
"#;

    #[test]
    fn sample_file_maps_to_session_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = parse_settings(file.path().to_str()).unwrap();
        assert_eq!(settings.endpoint.backend, "http");
        assert_eq!(settings.storage.path, "var/session.json");
        assert_eq!(settings.storage.poll_interval_ms, 250);

        let config = settings.session.to_config().unwrap();
        assert_eq!(config.refresh_threshold, Duration::from_secs(300));
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(
            config.backoff,
            BackoffStrategy::Exponential {
                max_delay: Duration::from_secs(30),
                jitter: false
            }
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("")).is_err());
    }

    fn session(backoff: &str, retry_delay_ms: u64) -> Session {
        Session {
            refresh_threshold_secs: 300,
            check_interval_ms: 1000,
            max_retries: 3,
            retry_delay_ms,
            backoff: backoff.to_string(),
            backoff_max_delay_ms: None,
            backoff_jitter: false,
            redirect_grace_ms: 0,
            attempt_timeout_ms: 1000,
            login_route: "/login".to_string(),
        }
    }

    #[test]
    fn unknown_backoff_is_rejected() {
        assert!(session("linear", 10).to_config().is_err());
    }

    #[test]
    fn default_backoff_cap_saturates() {
        let config = session("exponential", u64::MAX).to_config().unwrap();
        assert_eq!(
            config.backoff,
            BackoffStrategy::Exponential {
                max_delay: Duration::MAX,
                jitter: false
            }
        );
    }
}
