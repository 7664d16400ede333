use crate::engine::{jitter, FileFormat, DEFAULT_ANCESTOR_FLOOR};
use crate::error::SetupError;
use crate::policy::{BlockResponse, PolicyMode};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Next stage for queries the policy lets through.
    #[serde(default = "default_upstream")]
    pub upstream: Vec<String>,

    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

/// The `[policy]` block as written by the operator. Validated into a
/// [`SourceConfig`] and a [`PolicyMode`] at setup.
#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_block_response")]
    pub block_response: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_match_subdomains")]
    pub match_subdomains: bool,
    #[serde(default)]
    pub match_bare_tld: bool,
    #[serde(default)]
    pub reload: Option<String>,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

/// Where the domain list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainSource {
    File(PathBuf),
    Url(Url),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSourceType {
    File,
    Url,
}

impl DomainSource {
    pub fn source_type(&self) -> DomainSourceType {
        match self {
            DomainSource::File(_) => DomainSourceType::File,
            DomainSource::Url(_) => DomainSourceType::Url,
        }
    }
}

impl fmt::Display for DomainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainSource::File(path) => write!(f, "{}", path.display()),
            DomainSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Validated list source settings. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source: DomainSource,
    pub format: FileFormat,
    pub match_subdomains: bool,
    pub match_bare_tld: bool,
    /// Already jittered; zero disables periodic reload.
    pub reload_period: Duration,
    pub fetch_timeout: Duration,
}

impl SourceConfig {
    pub fn new(source: DomainSource, format: FileFormat) -> Self {
        Self {
            source,
            format,
            match_subdomains: default_match_subdomains(),
            match_bare_tld: false,
            reload_period: Duration::ZERO,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn source_type(&self) -> DomainSourceType {
        self.source.source_type()
    }

    /// Smallest label count the ancestor walk will probe.
    pub fn ancestor_floor(&self) -> usize {
        if self.match_bare_tld {
            1
        } else {
            DEFAULT_ANCESTOR_FLOOR
        }
    }
}

// Defaults
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5300
}
fn default_upstream() -> Vec<String> {
    vec!["8.8.8.8:53".to_string()]
}
fn default_upstream_timeout_ms() -> u64 {
    2000
}
fn default_mode() -> String {
    "warn".to_string()
}
fn default_block_response() -> String {
    "refused".to_string()
}
fn default_format() -> String {
    "textlist".to_string()
}
fn default_match_subdomains() -> bool {
    true
}
fn default_fetch_timeout() -> String {
    "30s".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: default_upstream(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            block_response: default_block_response(),
            file: None,
            url: None,
            format: default_format(),
            match_subdomains: default_match_subdomains(),
            match_bare_tld: false,
            reload: None,
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    pub fn upstream_addrs(&self) -> Result<Vec<SocketAddr>, SetupError> {
        self.upstream
            .iter()
            .map(|s| {
                s.parse::<SocketAddr>()
                    .map_err(|_| SetupError::InvalidUpstream(s.clone()))
            })
            .collect()
    }
}

impl PolicyConfig {
    /// Validates the list source. The reload period is jittered here, once.
    pub fn source_config(&self) -> Result<SourceConfig, SetupError> {
        let source = match (non_empty(&self.file), non_empty(&self.url)) {
            (Some(_), Some(_)) => return Err(SetupError::ConflictingSource),
            (None, None) => return Err(SetupError::MissingSource),
            (Some(path), None) => DomainSource::File(PathBuf::from(path)),
            (None, Some(raw)) => {
                DomainSource::Url(Url::parse(raw).map_err(|source| SetupError::InvalidUrl {
                    url: raw.to_string(),
                    source,
                })?)
            }
        };
        let format: FileFormat = self.format.parse()?;
        info!("Using domain list {} with format {}", source, format);

        let reload_period = match self.reload.as_deref() {
            Some(raw) => {
                let nominal = parse_duration(raw)
                    .ok_or_else(|| SetupError::InvalidDuration(raw.to_string()))?;
                let period = jitter(nominal);
                info!("Using reload period of {:?} (nominal {:?})", period, nominal);
                period
            }
            None => Duration::ZERO,
        };

        let fetch_timeout = parse_duration(&self.fetch_timeout)
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| SetupError::InvalidDuration(self.fetch_timeout.clone()))?;

        if self.match_subdomains {
            info!("Matching subdomains");
        } else {
            info!("Not matching subdomains");
        }

        Ok(SourceConfig {
            source,
            format,
            match_subdomains: self.match_subdomains,
            match_bare_tld: self.match_bare_tld,
            reload_period,
            fetch_timeout,
        })
    }

    pub fn policy_mode(&self) -> Result<PolicyMode, SetupError> {
        match self.mode.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(PolicyMode::Warn),
            "block" => Ok(PolicyMode::Block(
                self.block_response.parse::<BlockResponse>()?,
            )),
            _ => Err(SetupError::UnknownMode(self.mode.clone())),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Longest accepted duration: `i64::MAX` nanoseconds, roughly 292 years.
const MAX_DURATION: Duration = Duration::from_nanos(i64::MAX as u64);

/// Parses durations such as `90s`, `1h30m` or `250ms`. A bare `0` is zero.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest == "0" {
        return Some(Duration::ZERO);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ns" => Duration::from_nanos(value),
            "us" | "µs" => Duration::from_micros(value),
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            "h" => Duration::from_secs(value.checked_mul(3600)?),
            _ => return None,
        };
        rest = &rest[unit_len..];
        total = total.checked_add(part)?;
    }
    (total <= MAX_DURATION).then_some(total)
}
