//! appwatchd.toml configuration.
//!
//! Every section is optional and falls back to its defaults, so an empty
//! file (or no file at all) yields a runnable configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log_format: LogFormat,
    pub server: ServerConfig,
    pub discovery: DiscoveryConfig,
    pub inventory: InventoryConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// "500ms", "30s", "2m" or bare seconds.
    pub poll_interval: String,
    /// Capacity of each watcher's control channel.
    pub watcher_buffer: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: "30s".to_string(),
            watcher_buffer: appwatch_discovery::DEFAULT_CONTROL_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryConfig {
    pub url: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/v1/workloads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Base URL; each workload streams from `{url}/v1/workloads/{guid}/stream`.
    pub url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8081".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(mut self, listen: Option<SocketAddr>, poll_interval: Option<String>) -> Self {
        if let Some(listen) = listen {
            self.server.listen = listen;
        }
        if let Some(interval) = poll_interval {
            self.discovery.poll_interval = interval;
        }
        self
    }

    pub fn poll_interval(&self) -> anyhow::Result<Duration> {
        let interval = parse_duration(&self.discovery.poll_interval).with_context(|| {
            format!("invalid poll_interval {:?}", self.discovery.poll_interval)
        })?;
        ensure!(!interval.is_zero(), "poll_interval must be greater than zero");
        Ok(interval)
    }

    pub fn inventory_uri(&self) -> anyhow::Result<http::Uri> {
        parse_http_uri("inventory.url", &self.inventory.url)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.poll_interval()?;
        self.inventory_uri()?;
        parse_http_uri("stream.url", &self.stream.url)?;
        ensure!(
            self.discovery.watcher_buffer >= 1,
            "watcher_buffer must be at least 1"
        );
        Ok(())
    }
}

fn parse_http_uri(field: &str, value: &str) -> anyhow::Result<http::Uri> {
    let uri: http::Uri = value
        .parse()
        .with_context(|| format!("{field} is not a valid URL: {value:?}"))?;
    if uri.scheme_str() != Some("http") {
        bail!("{field} must be an http:// URL, got {value:?}");
    }
    if uri.host().is_none() {
        bail!("{field} has no host: {value:?}");
    }
    Ok(uri)
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
