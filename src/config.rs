use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::outbox::DeliveryRule;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("vk.token is not set (or VK_TOKEN)")]
    MissingVkToken,
    #[error("poller.groups is empty")]
    NoGroups,
    #[error("telegram is enabled but telegram.token is not set (or TG_TOKEN)")]
    MissingTelegramToken,
    #[error("telegram is enabled but telegram.chat_id is not set (or TG_CHAT)")]
    MissingTelegramChat,
    #[error("vk_repost is enabled but neither vk_repost.token nor vk.token is set")]
    MissingRepostToken,
    #[error("vk_repost is enabled but vk_repost.owner_id is not set (or VK_OUT_OWNER_ID)")]
    MissingRepostOwner,
    #[error("{section}.outbox.{field} must be positive")]
    NotPositive {
        section: &'static str,
        field: &'static str,
    },
    #[error("poller.{field} must be positive")]
    PollerNotPositive { field: &'static str },
    #[error("{section}.outbox.rate_per_sec allows fewer than one send per tick_timeout_secs ({tick})")]
    RateTooLow { section: &'static str, tick: u64 },
    #[error("{section}.outbox.lease_ttl_secs ({lease}) is shorter than tick_timeout_secs ({tick})")]
    LeaseShorterThanTick {
        section: &'static str,
        lease: u64,
        tick: u64,
    },
    #[error("{name}={value} is not a valid integer")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub vk: VkConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub vk_repost: VkRepostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_sqlite_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lostdogs")
        .join("lostdogs.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily log files when journald is unavailable.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VkConfig {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_api_version() -> String {
    "5.199".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_version: default_api_version(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Community screen names to watch.
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Posts fetched per group per pass.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_group_delay_ms")]
    pub group_delay_ms: u64,

    /// Upper bound for one full pass over all groups.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    #[serde(default = "default_exists_timeout_ms")]
    pub exists_timeout_ms: u64,

    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    50
}

fn default_group_delay_ms() -> u64 {
    500
}

fn default_scan_timeout_secs() -> u64 {
    20
}

fn default_exists_timeout_ms() -> u64 {
    500
}

fn default_store_timeout_secs() -> u64 {
    2
}

impl PollerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let not_positive = |field| ConfigError::PollerNotPositive { field };
        if self.interval_secs == 0 {
            return Err(not_positive("interval_secs"));
        }
        if self.page_size == 0 {
            return Err(not_positive("page_size"));
        }
        if self.scan_timeout_secs == 0 {
            return Err(not_positive("scan_timeout_secs"));
        }
        if self.exists_timeout_ms == 0 {
            return Err(not_positive("exists_timeout_ms"));
        }
        if self.store_timeout_secs == 0 {
            return Err(not_positive("store_timeout_secs"));
        }
        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            interval_secs: default_interval_secs(),
            page_size: default_page_size(),
            group_delay_ms: default_group_delay_ms(),
            scan_timeout_secs: default_scan_timeout_secs(),
            exists_timeout_ms: default_exists_timeout_ms(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

/// Outbox worker tuning, shared shape for every channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxSettings {
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    #[serde(default = "default_batch")]
    pub batch: usize,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_tick_timeout_secs")]
    pub tick_timeout_secs: u64,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

fn default_rate_per_sec() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    5
}

fn default_lease_ttl_secs() -> u64 {
    30
}

fn default_batch() -> usize {
    10
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_tick_timeout_secs() -> u64 {
    25
}

fn default_send_timeout_secs() -> u64 {
    15
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            max_retries: default_max_retries(),
            lease_ttl_secs: default_lease_ttl_secs(),
            batch: default_batch(),
            tick_interval_ms: default_tick_interval_ms(),
            tick_timeout_secs: default_tick_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl OutboxSettings {
    /// Pause between two sends, `None` unless the rate is a positive finite number.
    pub fn send_interval(&self) -> Option<Duration> {
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.rate_per_sec).ok()
    }

    fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        let not_positive = |field| ConfigError::NotPositive { section, field };
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            return Err(not_positive("rate_per_sec"));
        }
        if self.tick_timeout_secs == 0 {
            return Err(not_positive("tick_timeout_secs"));
        }
        if self.send_timeout_secs == 0 {
            return Err(not_positive("send_timeout_secs"));
        }
        if self.store_timeout_secs == 0 {
            return Err(not_positive("store_timeout_secs"));
        }
        let tick = Duration::from_secs(self.tick_timeout_secs);
        if !self.send_interval().is_some_and(|interval| interval <= tick) {
            return Err(ConfigError::RateTooLow {
                section,
                tick: self.tick_timeout_secs,
            });
        }
        if self.max_retries == 0 {
            return Err(not_positive("max_retries"));
        }
        if self.lease_ttl_secs == 0 {
            return Err(not_positive("lease_ttl_secs"));
        }
        if self.batch == 0 {
            return Err(not_positive("batch"));
        }
        if self.tick_interval_ms == 0 {
            return Err(not_positive("tick_interval_ms"));
        }
        if self.lease_ttl_secs < self.tick_timeout_secs {
            return Err(ConfigError::LeaseShorterThanTick {
                section,
                lease: self.lease_ttl_secs,
                tick: self.tick_timeout_secs,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub chat_id: Option<i64>,

    #[serde(default)]
    pub outbox: OutboxSettings,

    #[serde(default)]
    pub delivery: DeliveryRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VkRepostConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Falls back to `vk.token` when unset.
    #[serde(default)]
    pub token: Option<String>,

    /// Destination wall; negative for a community.
    #[serde(default)]
    pub owner_id: Option<i64>,

    #[serde(default = "default_from_group")]
    pub from_group: bool,

    #[serde(default)]
    pub outbox: OutboxSettings,

    #[serde(default)]
    pub delivery: DeliveryRule,
}

fn default_from_group() -> bool {
    true
}

impl Default for VkRepostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            owner_id: None,
            from_group: default_from_group(),
            outbox: OutboxSettings::default(),
            delivery: DeliveryRule::default(),
        }
    }
}

impl VkRepostConfig {
    /// Own token, else the feed token.
    pub fn effective_token<'a>(&'a self, vk: &'a VkConfig) -> Option<&'a str> {
        non_empty(&self.token).or_else(|| non_empty(&vk.token))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Config {
    /// Read the file at `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Override secrets from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    pub(crate) fn apply_env_from<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("VK_TOKEN") {
            self.vk.token = Some(token);
        }
        if let Some(token) = var("TG_TOKEN") {
            self.telegram.token = Some(token);
        }
        if let Some(chat) = var("TG_CHAT") {
            self.telegram.chat_id = Some(parse_env_int("TG_CHAT", &chat)?);
        }
        if let Some(token) = var("VK_OUT_TOKEN") {
            self.vk_repost.token = Some(token);
        }
        if let Some(owner) = var("VK_OUT_OWNER_ID") {
            self.vk_repost.owner_id = Some(parse_env_int("VK_OUT_OWNER_ID", &owner)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if non_empty(&self.vk.token).is_none() {
            return Err(ConfigError::MissingVkToken);
        }
        if self.poller.groups.iter().all(|g| g.trim().is_empty()) {
            return Err(ConfigError::NoGroups);
        }
        self.poller.validate()?;

        if self.telegram.enabled {
            if non_empty(&self.telegram.token).is_none() {
                return Err(ConfigError::MissingTelegramToken);
            }
            if self.telegram.chat_id.is_none() {
                return Err(ConfigError::MissingTelegramChat);
            }
            self.telegram.outbox.validate("telegram")?;
        }

        if self.vk_repost.enabled {
            if self.vk_repost.effective_token(&self.vk).is_none() {
                return Err(ConfigError::MissingRepostToken);
            }
            if self.vk_repost.owner_id.is_none() {
                return Err(ConfigError::MissingRepostOwner);
            }
            self.vk_repost.outbox.validate("vk_repost")?;
        }

        Ok(())
    }

    /// `explicit`, else `$LOSTDOGS_CONFIG`, else the user config dir.
    pub fn path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        if let Ok(path) = std::env::var("LOSTDOGS_CONFIG") {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lostdogs")
            .join("config.toml")
    }
}

fn parse_env_int(name: &'static str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}
