//! Portal configuration.
//!
//! A single [`PortalConfig`] value is loaded once (JSON, environment, or
//! built in code) and handed to [`crate::CourtScraperBuilder`]. Each
//! component receives only the values it needs through its constructor.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::challenges::core::{BackoffPolicy, TransportSettings};
use crate::challenges::pipeline::{AcquisitionBudget, RetryPolicy};
use crate::challenges::session::DEFAULT_SESSION_COOKIE;
use crate::portal::{DEFAULT_BASE_URL, DEFAULT_JUDGMENTS_BASE_URL};

/// Desktop Chrome user agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Prefix of the environment variables read by [`PortalConfig::from_env`].
pub const ENV_PREFIX: &str = "COURTSCRAPER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    /// Root of the judgment search portal.
    pub judgments_base_url: String,
    /// Minimum seconds between two requests of one client. Zero disables throttling.
    pub request_delay: f64,
    /// Per-request timeout in seconds.
    pub timeout: f64,
    /// Session/challenge/submit cycles per operation.
    pub max_attempts: usize,
    /// Tries per transport call (idempotent requests only, unless `retry_post`).
    pub transport_attempts: u32,
    pub backoff: BackoffPolicy,
    pub retry_post: bool,
    pub acquisition_budget: AcquisitionBudget,
    pub fatal_session_errors: bool,
    pub fatal_solver_errors: bool,
    pub user_agent: String,
    pub session_cookie: String,
    pub accept_invalid_certs: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            judgments_base_url: DEFAULT_JUDGMENTS_BASE_URL.to_string(),
            request_delay: 1.0,
            timeout: 30.0,
            max_attempts: 3,
            transport_attempts: 3,
            backoff: BackoffPolicy::default(),
            retry_post: false,
            acquisition_budget: AcquisitionBudget::default(),
            fatal_session_errors: false,
            fatal_solver_errors: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl PortalConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults overridden by `COURTSCRAPER_*` variables, e.g.
    /// `COURTSCRAPER_REQUEST_DELAY=2.5`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PortalConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        let mut config = Self::default();
        if let Some((_, value)) = get("BASE_URL") {
            config.base_url = value;
        }
        if let Some((_, value)) = get("JUDGMENTS_BASE_URL") {
            config.judgments_base_url = value;
        }
        if let Some((key, value)) = get("REQUEST_DELAY") {
            config.request_delay = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("TIMEOUT") {
            config.timeout = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("MAX_ATTEMPTS") {
            config.max_attempts = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("TRANSPORT_ATTEMPTS") {
            config.transport_attempts = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("BACKOFF") {
            config.backoff = serde_json::from_str(&value)
                .map_err(|_| ConfigError::InvalidValue { key, value })?;
        }
        if let Some((key, value)) = get("RETRY_POST") {
            config.retry_post = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("ACQUISITION_BUDGET") {
            config.acquisition_budget = parse_budget(&key, &value)?;
        }
        if let Some((key, value)) = get("FATAL_SESSION_ERRORS") {
            config.fatal_session_errors = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("FATAL_SOLVER_ERRORS") {
            config.fatal_solver_errors = parse_bool(&key, &value)?;
        }
        if let Some((_, value)) = get("USER_AGENT") {
            config.user_agent = value;
        }
        if let Some((_, value)) = get("SESSION_COOKIE") {
            config.session_cookie = value;
        }
        if let Some((key, value)) = get("ACCEPT_INVALID_CERTS") {
            config.accept_invalid_certs = parse_bool(&key, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("base_url", &self.base_url),
            ("judgments_base_url", &self.judgments_base_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "{name} {value:?} is not a valid url"
                )));
            }
        }
        if !self.request_delay.is_finite() || self.request_delay < 0.0 {
            return Err(ConfigError::Invalid(
                "request_delay must be a non-negative number of seconds".into(),
            ));
        }
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ConfigError::Invalid(
                "timeout must be a positive number of seconds".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.transport_attempts == 0 {
            return Err(ConfigError::Invalid(
                "transport_attempts must be at least 1".into(),
            ));
        }
        if self.acquisition_budget == (AcquisitionBudget::Separate { max_failures: 0 }) {
            return Err(ConfigError::Invalid(
                "acquisition_budget max_failures must be at least 1".into(),
            ));
        }
        if self.session_cookie.trim().is_empty() {
            return Err(ConfigError::Invalid("session_cookie must not be empty".into()));
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            acquisition_budget: self.acquisition_budget,
            fatal_session_errors: self.fatal_session_errors,
            fatal_solver_errors: self.fatal_solver_errors,
        }
    }
}

impl From<&PortalConfig> for TransportSettings {
    fn from(config: &PortalConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout_duration(),
            attempts: config.transport_attempts,
            backoff: config.backoff.clone(),
            retry_post: config.retry_post,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// `shared` or `separate:<max_failures>`.
fn parse_budget(key: &str, value: &str) -> Result<AcquisitionBudget, ConfigError> {
    let lowered = value.to_ascii_lowercase();
    if lowered == "shared" {
        return Ok(AcquisitionBudget::Shared);
    }
    if let Some(count) = lowered.strip_prefix("separate:") {
        return Ok(AcquisitionBudget::Separate {
            max_failures: parse(key, count.trim())?,
        });
    }
    Err(ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = PortalConfig::from_json_str(
            r#"{"request_delay": 0.5, "max_attempts": 5,
                "backoff": {"kind": "exponential", "base_secs": 0.5, "max_secs": 8.0},
                "acquisition_budget": {"kind": "separate", "max_failures": 4}}"#,
        )
        .unwrap();
        assert_eq!(config.request_delay, 0.5);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.timeout, 30.0);
        assert_eq!(config.session_cookie, "HCSERVICES_SESSID");
        assert_eq!(
            config.acquisition_budget,
            AcquisitionBudget::Separate { max_failures: 4 }
        );
        assert!(matches!(
            config.backoff,
            BackoffPolicy::Exponential { jitter: false, .. }
        ));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PortalConfig::from_lookup(lookup(&[
            ("COURTSCRAPER_REQUEST_DELAY", "2.5"),
            ("COURTSCRAPER_MAX_ATTEMPTS", " 7 "),
            ("COURTSCRAPER_RETRY_POST", "yes"),
            ("COURTSCRAPER_ACQUISITION_BUDGET", "separate:2"),
            ("COURTSCRAPER_BASE_URL", "http://127.0.0.1:9000/hcservices"),
            ("COURTSCRAPER_USER_AGENT", ""),
            ("COURTSCRAPER_JUDGMENTS_BASE_URL", "http://127.0.0.1:9000/pdfsearch"),
        ]))
        .unwrap();
        assert_eq!(config.judgments_base_url, "http://127.0.0.1:9000/pdfsearch");
        assert_eq!(config.request_delay, 2.5);
        assert_eq!(config.max_attempts, 7);
        assert!(config.retry_post);
        assert_eq!(
            config.acquisition_budget,
            AcquisitionBudget::Separate { max_failures: 2 }
        );
        assert_eq!(config.base_url, "http://127.0.0.1:9000/hcservices");
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn malformed_environment_value_is_reported() {
        let err = PortalConfig::from_lookup(lookup(&[("COURTSCRAPER_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "COURTSCRAPER_TIMEOUT"));
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let zero_attempts = PortalConfig {
            max_attempts: 0,
            ..PortalConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let negative_delay = PortalConfig {
            request_delay: -1.0,
            ..PortalConfig::default()
        };
        assert!(negative_delay.validate().is_err());

        assert!(PortalConfig::from_json_str(r#"{"base_url": "not a url"}"#).is_err());
        assert!(PortalConfig::from_json_str(r#"{"judgments_base_url": "pdfsearch"}"#).is_err());

        let empty_budget = PortalConfig {
            acquisition_budget: AcquisitionBudget::Separate { max_failures: 0 },
            ..PortalConfig::default()
        };
        assert!(matches!(empty_budget.validate(), Err(ConfigError::Invalid(_))));
        assert!(
            PortalConfig::from_lookup(lookup(&[(
                "COURTSCRAPER_ACQUISITION_BUDGET",
                "separate:0"
            )]))
            .is_err()
        );
    }

    #[test]
    fn transport_settings_follow_config() {
        let config = PortalConfig {
            timeout: 1.5,
            transport_attempts: 5,
            ..PortalConfig::default()
        };
        let settings = TransportSettings::from(&config);
        assert_eq!(settings.timeout, Duration::from_millis(1500));
        assert_eq!(settings.attempts, 5);
        assert!(!settings.retry_post);
    }
}
