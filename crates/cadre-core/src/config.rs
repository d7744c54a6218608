//! TOML + environment configuration, loaded from `~/.cadre/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub model_routing: ModelRoutingConfig,
    #[serde(default)]
    pub spending: SpendingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            store: StoreConfig::default(),
            providers: ProvidersConfig::default(),
            model_routing: ModelRoutingConfig::default(),
            spending: SpendingConfig::default(),
            scheduler: SchedulerConfig::default(),
            daemon: DaemonConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `~/.cadre/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cadre")
            .join("config.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            timezone: default_timezone(),
        }
    }
}

fn default_project_name() -> String {
    "cadre".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_timezone() -> String {
    "UTC".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cadre")
        .join("cadre.sqlite3")
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_t1_model")]
    pub t1_model: String,
    #[serde(default = "default_t2_model")]
    pub t2_model: String,
    #[serde(default = "default_t3_model")]
    pub t3_model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            t1_model: default_t1_model(),
            t2_model: default_t2_model(),
            t3_model: default_t3_model(),
            api_base: None,
            api_key_env: Some("CADRE_LLM_API_KEY".into()),
        }
    }
}

fn default_t1_model() -> String {
    "claude-haiku-4".into()
}
fn default_t2_model() -> String {
    "claude-sonnet-4".into()
}
fn default_t3_model() -> String {
    "claude-opus-4".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoutingConfig {
    #[serde(default = "default_t1_retry_secs")]
    pub t1_retry_secs: u64,
    #[serde(default = "default_max_fallbacks")]
    pub max_fallbacks: u32,
}

impl Default for ModelRoutingConfig {
    fn default() -> Self {
        Self {
            t1_retry_secs: default_t1_retry_secs(),
            max_fallbacks: default_max_fallbacks(),
        }
    }
}

fn default_t1_retry_secs() -> u64 {
    5
}
fn default_max_fallbacks() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingConfig {
    #[serde(default = "default_daily_limit_usd")]
    pub daily_limit_usd: f64,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_pct: f64,
}

impl Default for SpendingConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit_usd(),
            alert_threshold_pct: default_alert_threshold(),
        }
    }
}

fn default_daily_limit_usd() -> f64 {
    50.0
}
fn default_alert_threshold() -> f64 {
    0.8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_standup_time")]
    pub standup_time: String,
    #[serde(default = "default_summary_time")]
    pub summary_time: String,
    #[serde(default = "default_backup_time")]
    pub backup_time: String,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            standup_time: default_standup_time(),
            summary_time: default_summary_time(),
            backup_time: default_backup_time(),
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

fn default_standup_time() -> String {
    "09:00".into()
}
fn default_summary_time() -> String {
    "18:00".into()
}
fn default_backup_time() -> String {
    "02:00".into()
}
fn default_health_check_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            health_port: default_health_port(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    5
}
fn default_health_port() -> u16 {
    8787
}

/// Founder-only chat surface (§6): the platform token and alert channel are
/// secrets/operational detail, read from the environment; everything else
/// that shapes command behavior lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub founder_user_id: Option<String>,
    #[serde(default = "default_alerts_channel")]
    pub alerts_channel: String,
    #[serde(default)]
    pub chat_token_env: Option<String>,
    #[serde(default = "default_post_split_bytes")]
    pub post_split_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            founder_user_id: None,
            alerts_channel: default_alerts_channel(),
            chat_token_env: Some("CADRE_CHAT_TOKEN".into()),
            post_split_bytes: default_post_split_bytes(),
        }
    }
}

fn default_alerts_channel() -> String {
    "#alerts".into()
}
fn default_post_split_bytes() -> usize {
    1900
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = Config::default();
        assert_eq!(cfg.general.project_name, "cadre");
        assert_eq!(cfg.spending.daily_limit_usd, 50.0);
        assert_eq!(cfg.model_routing.t1_retry_secs, 5);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = Config::default();
        let text = cfg.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.general.project_name, cfg.general.project_name);
    }

    #[test]
    fn load_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let cfg = if path.exists() {
            Config::load_from(path).unwrap()
        } else {
            Config::default()
        };
        assert_eq!(cfg.general.project_name, "cadre");
    }
}
