// ABOUTME: Validated session configuration built from a mirai:// URL or discrete fields.
// ABOUTME: Also holds cache and polling options with their defaults.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// URL scheme accepted by `SessionConfig::from_url`
pub const URL_SCHEME: &str = "mirai";

/// Connection inputs as they come from a config file or CLI.
///
/// Either `url` is set, or all four discrete fields are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qq: Option<i64>,
}

/// Which rosters to load when the session is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    #[serde(default = "default_true")]
    pub groups: bool,
    #[serde(default = "default_true")]
    pub friends: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            groups: true,
            friends: true,
        }
    }
}

/// What the dispatcher does when a handler returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerFailurePolicy {
    /// Log the failure and keep dispatching
    #[default]
    Isolate,
    /// Stop the worker and surface the failure on stop/close
    Abort,
}

/// Poller and dispatcher tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptions {
    /// Items requested per fetch
    #[serde(default = "default_count")]
    pub count: usize,
    /// Pause before each poll cycle
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How long the dispatcher waits on the queue before re-checking for shutdown
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
    /// Stop the worker on the first handler failure
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_true() -> bool {
    true
}

fn default_count() -> usize {
    10
}

fn default_interval_ms() -> u64 {
    500
}

fn default_queue_timeout_ms() -> u64 {
    2000
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            count: default_count(),
            interval_ms: default_interval_ms(),
            queue_timeout_ms: default_queue_timeout_ms(),
            fail_fast: false,
        }
    }
}

impl PollOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn failure_policy(&self) -> HandlerFailurePolicy {
        if self.fail_fast {
            HandlerFailurePolicy::Abort
        } else {
            HandlerFailurePolicy::Isolate
        }
    }

    pub fn validate(&self) -> Result<()> {
        // A zero count would make every batch look saturated
        if self.count == 0 {
            return Err(SessionError::config("polling count must be at least 1"));
        }
        if self.queue_timeout_ms == 0 {
            return Err(SessionError::config("queue timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Validated connection settings for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_url: String,
    pub auth_key: String,
    pub account_id: i64,
    pub cache: CacheOptions,
    pub polling: PollOptions,
}

impl SessionConfig {
    /// Parse `mirai://host:port/?authKey=...&qq=...`
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| SessionError::config(format!("invalid url: {}", e)))?;

        if parsed.scheme() != URL_SCHEME {
            return Err(SessionError::config(format!(
                "invalid url: scheme must be '{}', got '{}'",
                URL_SCHEME,
                parsed.scheme()
            )));
        }
        if parsed.path() != "/" {
            return Err(SessionError::config("invalid url: path must be '/'"));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SessionError::config("invalid url: missing host"))?;
        let auth_key = first_query_value(&parsed, "authKey")
            .ok_or_else(|| SessionError::config("invalid url: missing authKey"))?;
        let qq = first_query_value(&parsed, "qq")
            .ok_or_else(|| SessionError::config("invalid url: missing qq"))?;

        let base_url = match parsed.port() {
            Some(port) => format!("http://{}:{}", host, port),
            None => format!("http://{}", host),
        };

        Ok(Self {
            base_url,
            auth_key,
            account_id: parse_account_id(&qq)?,
            cache: CacheOptions::default(),
            polling: PollOptions::default(),
        })
    }

    /// Build from the four discrete fields
    pub fn from_parts(host: &str, port: u16, auth_key: &str, account_id: i64) -> Result<Self> {
        if host.is_empty() || port == 0 || auth_key.is_empty() || account_id <= 0 {
            return Err(SessionError::config(
                "host, port, auth key and account id are all required",
            ));
        }
        Ok(Self {
            base_url: format!("http://{}:{}", host, port),
            auth_key: auth_key.to_string(),
            account_id,
            cache: CacheOptions::default(),
            polling: PollOptions::default(),
        })
    }

    /// Build from loosely-typed params, preferring `url` when present
    pub fn from_params(params: &ConnectionParams) -> Result<Self> {
        if let Some(url) = params.url.as_deref().filter(|u| !u.is_empty()) {
            return Self::from_url(url);
        }
        match (&params.host, params.port, &params.auth_key, params.qq) {
            (Some(host), Some(port), Some(auth_key), Some(qq)) => {
                Self::from_parts(host, port, auth_key, qq)
            }
            _ => Err(SessionError::config(
                "either a connection url or host, port, auth_key and qq must be set",
            )),
        }
    }

    pub fn with_cache(mut self, cache: CacheOptions) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_polling(mut self, polling: PollOptions) -> Result<Self> {
        polling.validate()?;
        self.polling = polling;
        Ok(self)
    }
}

/// First non-empty value for `key`, matching how query strings drop blanks
fn first_query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

fn parse_account_id(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(SessionError::config(format!(
            "invalid url: qq must be a positive number, got '{}'",
            raw
        ))),
    }
}
