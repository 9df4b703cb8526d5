use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rate_limit::RateLimiter;
use crate::retry::{PolicyError, RetryPolicy, DEFAULT_RETRY_STATUSES};

/// Timeout bounds accepted for requests, in seconds.
pub const MIN_TIMEOUT_SECS: f64 = 1.0;
pub const MAX_TIMEOUT_SECS: f64 = 300.0;

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Multiplier applied per attempt.
    pub growth_factor: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: f64,
    pub jitter: bool,
    /// Upper bound of the random extra delay, as a fraction of the delay.
    pub jitter_fraction: f64,
    /// HTTP statuses worth retrying (429 and 5xx only).
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let p = RetryPolicy::default();
        Self {
            max_attempts: p.max_attempts(),
            base_delay_secs: p.base_delay().as_secs_f64(),
            growth_factor: p.growth_factor(),
            max_delay_secs: p.max_delay().as_secs_f64(),
            jitter: p.jitter(),
            jitter_fraction: p.jitter_fraction(),
            retry_on_status: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, PolicyError> {
    Duration::try_from_secs_f64(value).map_err(|_| PolicyError::InvalidSeconds { field, value })
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(c: &RetryConfig) -> Result<Self, Self::Error> {
        RetryPolicy::builder()
            .max_attempts(c.max_attempts)
            .base_delay(secs("base_delay_secs", c.base_delay_secs)?)
            .growth_factor(c.growth_factor)
            .max_delay(secs("max_delay_secs", c.max_delay_secs)?)
            .jitter(c.jitter)
            .jitter_fraction(c.jitter_fraction)
            .retry_on_status(c.retry_on_status.iter().copied())
            .build()
    }
}

/// Client-side rate limit (optional `[rate_limit]` section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Ceiling for the trailing 1 s window (None = unlimited).
    pub requests_per_second: Option<u32>,
    /// Ceiling for the trailing 60 s window (None = unlimited).
    pub requests_per_minute: Option<u32>,
    /// Give up instead of waiting longer than this for a slot (None = wait).
    pub max_wait_secs: Option<f64>,
}

impl RateLimitConfig {
    pub fn build(&self) -> Result<RateLimiter> {
        let per_second = ceiling("requests_per_second", self.requests_per_second)?;
        let per_minute = ceiling("requests_per_minute", self.requests_per_minute)?;
        let max_wait = self
            .max_wait_secs
            .map(|s| secs("max_wait_secs", s))
            .transpose()?;
        Ok(RateLimiter::new(per_second, per_minute).with_max_wait(max_wait))
    }
}

/// A configured ceiling must be positive; leave it out for "unlimited".
fn ceiling(field: &'static str, value: Option<u32>) -> Result<Option<NonZeroU32>> {
    value
        .map(|v| NonZeroU32::new(v).with_context(|| format!("{field} must be positive")))
        .transpose()
}

/// Global configuration loaded from `~/.config/restc/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL for relative request paths.
    pub base_url: Option<String>,
    /// Default request timeout in seconds (1..=300).
    pub timeout_secs: f64,
    pub verify_tls: bool,
    /// Refuse requests to loopback, private and link-local addresses.
    pub block_private_hosts: bool,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
    /// Extra default headers for every request.
    pub headers: BTreeMap<String, String>,
    /// Optional retry policy; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
    /// Optional client-side rate limit; if missing, requests are not limited.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30.0,
            verify_tls: true,
            block_private_hosts: false,
            bearer_token: None,
            headers: BTreeMap::new(),
            retry: None,
            rate_limit: None,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(&self) -> Result<Duration> {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            anyhow::bail!(
                "timeout_secs must be between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS,
                MAX_TIMEOUT_SECS,
                self.timeout_secs
            );
        }
        Ok(Duration::from_secs_f64(self.timeout_secs))
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        match &self.retry {
            Some(c) => Ok(RetryPolicy::try_from(c).context("invalid [retry] section")?),
            None => Ok(RetryPolicy::default()),
        }
    }

    pub fn rate_limiter(&self) -> Result<RateLimiter> {
        match &self.rate_limit {
            Some(c) => c.build().context("invalid [rate_limit] section"),
            None => Ok(RateLimiter::unlimited()),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("restc")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ClientConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ClientConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<ClientConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: ClientConfig =
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ClientConfig::default();
        assert!(cfg.base_url.is_none());
        assert_eq!(cfg.timeout().unwrap(), Duration::from_secs(30));
        assert!(cfg.verify_tls);
        assert!(!cfg.block_private_hosts);
        assert_eq!(cfg.retry_policy().unwrap(), RetryPolicy::default());
        assert!(cfg.rate_limiter().unwrap().allows_request());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = ClientConfig::default().with_base_url("https://api.example.com");
        cfg.headers.insert("X-Team".into(), "infra".into());
        cfg.retry = Some(RetryConfig::default());
        cfg.rate_limit = Some(RateLimitConfig {
            requests_per_second: Some(5),
            ..Default::default()
        });
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_sections() {
        let toml = r#"
            base_url = "https://api.example.com"
            timeout_secs = 10

            [headers]
            Accept-Language = "en"

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            jitter = false

            [rate_limit]
            requests_per_second = 5
            requests_per_minute = 100
            max_wait_secs = 30
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(cfg.timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(cfg.headers.get("Accept-Language").map(String::as_str), Some("en"));

        let policy = cfg.retry_policy().unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_millis(500));
        assert_eq!(policy.growth_factor(), 2.0);
        assert!(!policy.jitter());
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));

        let rl = cfg.rate_limit.as_ref().unwrap();
        assert_eq!(rl.requests_per_second, Some(5));
        assert_eq!(rl.requests_per_minute, Some(100));
        let limiter = cfg.rate_limiter().unwrap();
        assert_eq!(limiter.max_wait(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cfg = ClientConfig {
            timeout_secs: 0.5,
            ..Default::default()
        };
        assert!(cfg.timeout().is_err());

        let cfg = ClientConfig {
            retry: Some(RetryConfig {
                base_delay_secs: -1.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(cfg.retry_policy().is_err());

        let cfg = ClientConfig {
            retry: Some(RetryConfig {
                retry_on_status: vec![404],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(cfg.retry_policy().is_err());

        let cfg = ClientConfig {
            rate_limit: Some(RateLimitConfig {
                requests_per_second: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(cfg.rate_limiter().is_err());

        let zero_minute = RateLimitConfig {
            requests_per_minute: Some(0),
            ..Default::default()
        };
        let err = zero_minute.build().unwrap_err();
        assert!(err.to_string().contains("requests_per_minute"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "verify_tls = false\n[retry]\nmax_attempts = 2\n").unwrap();
        let cfg = load_from(&path).unwrap();
        assert!(!cfg.verify_tls);
        assert_eq!(cfg.retry_policy().unwrap().max_attempts(), 2);

        assert!(load_from(&dir.path().join("missing.toml")).is_err());
    }
}
