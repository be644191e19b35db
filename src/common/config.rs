//! Configuration for syncrony components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix; nested keys use `__`, e.g. `SYNCRONY__ELECTION__TTL_SECS`.
pub const ENV_PREFIX: &str = "SYNCRONY";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Election settings
    #[serde(default)]
    pub election: ElectionConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Store client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URLs of the store nodes, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// API version segment (`v2`)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Key namespace segment
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Pause between rounds when no endpoint is reachable
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Relative jitter applied to the retry pause (0.2 = ±20%)
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,

    /// TCP connect timeout per endpoint attempt; unset waits for the OS
    #[serde(default = "default_connect_timeout", skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

fn default_endpoints() -> Vec<String> {
    vec!["http://localhost:4001".to_string()]
}
fn default_version() -> u32 {
    2
}
fn default_prefix() -> String {
    "keys".to_string()
}
fn default_retry_interval() -> u64 {
    5_000
}
fn default_retry_jitter() -> f64 {
    0.2
}
fn default_connect_timeout() -> Option<u64> {
    Some(2_000)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            version: default_version(),
            prefix: default_prefix(),
            retry_interval_ms: default_retry_interval(),
            retry_jitter: default_retry_jitter(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig("at least one store endpoint is required".into()));
        }
        if let Some(bad) = self
            .endpoints
            .iter()
            .find(|e| !(e.starts_with("http://") || e.starts_with("https://")))
        {
            return Err(Error::InvalidConfig(format!(
                "endpoint {} must be an http:// URL",
                bad
            )));
        }
        if !(0.0..1.0).contains(&self.retry_jitter) {
            return Err(Error::InvalidConfig(format!(
                "retry_jitter must be in [0, 1), got {}",
                self.retry_jitter
            )));
        }
        Ok(())
    }
}

/// How a leader proves it still holds the lock when renewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewWith {
    /// `prevValue=<identifier>`; identifiers must be unique per participant
    #[default]
    Value,
    /// `prevIndex=<last confirmed modifiedIndex>`; detects any intervening write
    Index,
}

/// Election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Lock key, shared by every participant of the same election
    #[serde(default = "default_path")]
    pub path: String,

    /// Lease on the lock, in whole seconds
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Time between renewals; must be shorter than the lease
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Value written into the lock. Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(default)]
    pub renew_with: RenewWith,
}

fn default_path() -> String {
    "syncrony/leader".to_string()
}
fn default_ttl() -> u64 {
    15
}
fn default_interval() -> u64 {
    5_000
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            ttl_secs: default_ttl(),
            interval_ms: default_interval(),
            identifier: None,
            renew_with: RenewWith::default(),
        }
    }
}

impl ElectionConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim_matches('/').is_empty() {
            return Err(Error::InvalidConfig("election path cannot be empty".into()));
        }
        if self.ttl_secs == 0 {
            return Err(Error::InvalidConfig("ttl_secs must be at least 1".into()));
        }
        if self.interval_ms == 0 || self.interval() >= self.ttl() {
            return Err(Error::InvalidConfig(format!(
                "renewal interval ({}ms) must be positive and shorter than the ttl ({}s)",
                self.interval_ms, self.ttl_secs
            )));
        }
        if self.identifier.as_deref() == Some("") {
            return Err(Error::InvalidConfig("identifier cannot be empty".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load from an optional TOML file, then `SYNCRONY__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("store.endpoints")
                    .try_parsing(true),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.election.validate()
    }
}
