use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_BACKLOG_CONFIG: &str = "BACKLOG_CONFIG";

const DEFAULT_CONCURRENCY_LIMIT: usize = 10;
const DEFAULT_SERVICE_BUFFER_CAPACITY: usize = 64;
const DEFAULT_GLOBAL_BUFFER_CAPACITY: usize = 512;
const DEFAULT_RETRY_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BacklogConfig {
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_concurrency_limit")]
    pub default_concurrency_limit: usize,
    #[serde(default)]
    pub service: Vec<ServiceLimitEntry>,
    #[serde(default)]
    pub eventbus: EventBusConfigToml,
    #[serde(default)]
    pub retry: RetryConfigToml,
    #[serde(default)]
    pub transcribe: TranscribeConfigToml,
}

/// Per-service override of the default concurrency limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceLimitEntry {
    pub service_api: String,
    pub concurrency_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventBusConfigToml {
    #[serde(default = "default_service_buffer_capacity")]
    pub service_buffer_capacity: usize,
    #[serde(default = "default_global_buffer_capacity")]
    pub global_buffer_capacity: usize,
}

impl Default for EventBusConfigToml {
    fn default() -> Self {
        Self {
            service_buffer_capacity: default_service_buffer_capacity(),
            global_buffer_capacity: default_global_buffer_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfigToml {
    #[serde(default = "default_retry_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for RetryConfigToml {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_retry_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscribeConfigToml {
    /// IAM role substituted into submissions so the downstream service can
    /// read the caller's media. Absent means the params pass through as-is.
    #[serde(default)]
    pub data_access_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaLimitsConfig {
    pub default_limit: usize,
    pub overrides: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusRuntimeConfig {
    pub service_buffer_capacity: usize,
    pub global_buffer_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRuntimeConfig {
    pub poll_interval_secs: u64,
}

impl BacklogConfig {
    pub fn quota_limits(&self) -> QuotaLimitsConfig {
        QuotaLimitsConfig {
            default_limit: self.default_concurrency_limit,
            overrides: self
                .service
                .iter()
                .map(|entry| (entry.service_api.clone(), entry.concurrency_limit))
                .collect(),
        }
    }

    pub fn eventbus_runtime(&self) -> EventBusRuntimeConfig {
        EventBusRuntimeConfig {
            service_buffer_capacity: self.eventbus.service_buffer_capacity,
            global_buffer_capacity: self.eventbus.global_buffer_capacity,
        }
    }

    pub fn retry_runtime(&self) -> RetryRuntimeConfig {
        RetryRuntimeConfig {
            poll_interval_secs: self.retry.poll_interval_secs,
        }
    }
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            default_concurrency_limit: default_concurrency_limit(),
            service: Vec::new(),
            eventbus: EventBusConfigToml::default(),
            retry: RetryConfigToml::default(),
            transcribe: TranscribeConfigToml::default(),
        }
    }
}

pub fn load_from_env() -> Result<BacklogConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<BacklogConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("backlog").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_BACKLOG_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "BACKLOG_CONFIG contained invalid UTF-8",
        )),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn default_backlog_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("XDG_DATA_HOME") {
        let path = path.trim();
        if !path.is_empty() {
            return PathBuf::from(path).join("backlog");
        }
    }
    if let Some(home) = resolve_home_dir() {
        return home.join(".local").join("share").join("backlog");
    }

    std::env::temp_dir().join("backlog")
}

fn default_store_path() -> String {
    default_backlog_data_dir()
        .join("backlog-jobs.db")
        .to_string_lossy()
        .to_string()
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_service_buffer_capacity() -> usize {
    DEFAULT_SERVICE_BUFFER_CAPACITY
}

fn default_global_buffer_capacity() -> usize {
    DEFAULT_GLOBAL_BUFFER_CAPACITY
}

fn default_retry_poll_interval_secs() -> u64 {
    DEFAULT_RETRY_POLL_INTERVAL_SECS
}

fn persist_config(path: &Path, config: &BacklogConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize BACKLOG_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write BACKLOG_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<BacklogConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for BACKLOG_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = BacklogConfig::default();
            persist_config(path, &default_config)?;

            toml::to_string_pretty(&default_config).map_err(|err| {
                ConfigError::configuration(format!(
                    "Failed to serialize default BACKLOG_CONFIG: {err}"
                ))
            })?
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read BACKLOG_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: BacklogConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse BACKLOG_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    let changed = normalize_config(&mut config);
    if changed {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn normalize_config(config: &mut BacklogConfig) -> bool {
    let mut changed = false;

    if config.store_path.trim().is_empty() {
        config.store_path = default_store_path();
        changed = true;
    } else if config.store_path.trim() != config.store_path {
        config.store_path = config.store_path.trim().to_owned();
        changed = true;
    }

    if config.default_concurrency_limit == 0 {
        config.default_concurrency_limit = default_concurrency_limit();
        changed = true;
    }

    let before = config.service.len();
    for entry in &mut config.service {
        let trimmed = entry.service_api.trim();
        if trimmed != entry.service_api {
            entry.service_api = trimmed.to_owned();
            changed = true;
        }
        if entry.concurrency_limit == 0 {
            entry.concurrency_limit = 1;
            changed = true;
        }
    }
    config.service.retain(|entry| !entry.service_api.is_empty());
    if config.service.len() != before {
        changed = true;
    }

    let normalized_service_capacity = if config.eventbus.service_buffer_capacity == 0 {
        default_service_buffer_capacity()
    } else {
        config.eventbus.service_buffer_capacity.clamp(1, 4_096)
    };
    if normalized_service_capacity != config.eventbus.service_buffer_capacity {
        config.eventbus.service_buffer_capacity = normalized_service_capacity;
        changed = true;
    }

    let normalized_global_capacity = if config.eventbus.global_buffer_capacity == 0 {
        default_global_buffer_capacity()
    } else {
        config.eventbus.global_buffer_capacity.clamp(1, 16_384)
    };
    if normalized_global_capacity != config.eventbus.global_buffer_capacity {
        config.eventbus.global_buffer_capacity = normalized_global_capacity;
        changed = true;
    }

    let normalized_poll_interval = config.retry.poll_interval_secs.clamp(1, 3_600);
    if normalized_poll_interval != config.retry.poll_interval_secs {
        config.retry.poll_interval_secs = normalized_poll_interval;
        changed = true;
    }

    if let Some(role) = &config.transcribe.data_access_role {
        let trimmed = role.trim();
        if trimmed.is_empty() {
            config.transcribe.data_access_role = None;
            changed = true;
        } else if trimmed != role {
            config.transcribe.data_access_role = Some(trimmed.to_owned());
            changed = true;
        }
    }

    changed
}
