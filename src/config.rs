//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::AppError;

/// Default cadence between progress queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Polling policy for a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between two status queries (default: 2000 ms).
    pub interval: Duration,
    /// Give up after this long without a completed status. `None` polls until
    /// the backend reports completion.
    pub max_duration: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_duration: None,
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL (`CARETEAM_API_URL`, required).
    pub api_url: Url,

    /// Bearer token for the backend (`CARETEAM_API_TOKEN`).
    pub api_token: Option<SecretString>,

    /// Organization whose user directory supplies assignees (`CARETEAM_ORG_ID`, required).
    pub org_id: String,

    /// HTTP request timeout (`CARETEAM_REQUEST_TIMEOUT_SECS`, default: 30).
    pub request_timeout: Duration,

    /// Progress polling policy (`CARETEAM_POLL_INTERVAL_MS`, `CARETEAM_MAX_POLL_SECS`).
    pub poll: PollConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("CARETEAM_API_URL")
            .ok_or_else(|| AppError::Config("CARETEAM_API_URL is required".to_string()))?;
        let api_url = Url::parse(&api_url)
            .map_err(|e| AppError::Config(format!("CARETEAM_API_URL is not a valid URL: {e}")))?;

        let api_token = lookup("CARETEAM_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        let org_id = lookup("CARETEAM_ORG_ID")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Config("CARETEAM_ORG_ID is required".to_string()))?;

        let request_timeout = parse_number(&lookup, "CARETEAM_REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let interval = parse_number(&lookup, "CARETEAM_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if interval.is_zero() {
            return Err(AppError::Config(
                "CARETEAM_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        let max_duration = parse_number(&lookup, "CARETEAM_MAX_POLL_SECS")?.map(Duration::from_secs);

        Ok(Self {
            api_url,
            api_token,
            org_id,
            request_timeout,
            poll: PollConfig {
                interval,
                max_duration,
            },
        })
    }
}

fn parse_number<F>(lookup: &F, key: &str) -> Result<Option<u64>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer"))),
        None => Ok(None),
    }
}
