//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.skillwatch.toml` files.

use crate::error::WatchError;
use crate::notify::{Channel, ChannelKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".skillwatch.toml";

/// Longest accepted interval: one year.
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Interval and loop settings.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Skill selection and limits.
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Alert channels and rate limiting.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Inbound event receiver.
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Result history.
    #[serde(default)]
    pub store: StoreConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// URL of the monitored target.
    #[serde(default)]
    pub target_url: String,

    /// Write the JSON run summary here after every cycle.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between interval-triggered cycles.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Pause after a failed loop iteration.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            error_backoff_seconds: default_error_backoff(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_error_backoff() -> u64 {
    60
}

/// Skill settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Skills to run each cycle. Empty means all registered skills.
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Upper bound for a single skill run.
    #[serde(default = "default_skill_timeout")]
    pub timeout_seconds: u64,

    /// Responses slower than this make the HTTP probe warn.
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_ms: u64,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            timeout_seconds: default_skill_timeout(),
            slow_threshold_ms: default_slow_threshold(),
        }
    }
}

fn default_skill_timeout() -> u64 {
    120
}

fn default_slow_threshold() -> u64 {
    3000
}

/// Alert settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Channels every result is sent to.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,

    /// Webhook URL for Discord/Slack.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Minimum seconds between two alerts for the same skill and status.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Webhook request timeout.
    #[serde(default = "default_alert_timeout")]
    pub timeout_seconds: u64,

    /// Also alert on PASS results.
    #[serde(default)]
    pub notify_on_pass: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            webhook_url: None,
            cooldown_seconds: default_cooldown(),
            timeout_seconds: default_alert_timeout(),
            notify_on_pass: false,
        }
    }
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Stdout]
}

fn default_cooldown() -> u64 {
    3600
}

fn default_alert_timeout() -> u64 {
    30
}

/// Inbound event receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

/// Result history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding `checks.jsonl` and `baselines.json`.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_store_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_store_path() -> PathBuf {
    PathBuf::from("skillwatch-data")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.url {
            self.general.target_url = url.clone();
        }
        if let Some(interval) = args.interval {
            self.schedule.interval_minutes = interval;
        }
        if !args.skills.is_empty() {
            self.skills.enabled = args.skills.clone();
        }
        if !args.channels.is_empty() {
            self.alerts.channels = args.channels.clone();
        }
        if let Some(ref webhook_url) = args.webhook_url {
            self.alerts.webhook_url = Some(webhook_url.clone());
        }
        if let Some(cooldown) = args.cooldown {
            self.alerts.cooldown_seconds = cooldown;
        }
        if let Some(ref listen) = args.listen {
            self.ingress.enabled = true;
            self.ingress.bind = listen.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }
        if args.no_store {
            self.store.enabled = false;
        }
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> std::result::Result<(), WatchError> {
        let url = &self.general.target_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(WatchError::InvalidConfig(format!(
                "target URL must start with 'http://' or 'https://', got '{}'",
                url
            )));
        }

        if self.schedule.interval_minutes == 0 {
            return Err(WatchError::InvalidConfig(
                "interval must be at least 1 minute".to_string(),
            ));
        }

        if self.schedule.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(WatchError::InvalidConfig(format!(
                "interval of {} minutes is too large (max {})",
                self.schedule.interval_minutes, MAX_INTERVAL_MINUTES
            )));
        }

        if self.skills.timeout_seconds == 0 {
            return Err(WatchError::InvalidConfig(
                "skill timeout must be at least 1 second".to_string(),
            ));
        }

        if self.alerts.channels.is_empty() {
            return Err(WatchError::InvalidConfig(
                "at least one alert channel is required".to_string(),
            ));
        }

        let needs_webhook = self
            .alerts
            .channels
            .iter()
            .any(|kind| *kind != ChannelKind::Stdout);
        if needs_webhook && self.alerts.webhook_url.is_none() {
            return Err(WatchError::InvalidConfig(
                "discord and slack channels require a webhook URL".to_string(),
            ));
        }

        Ok(())
    }

    /// Concrete channels built from the alert settings.
    pub fn channels(&self) -> Vec<Channel> {
        self.alerts
            .channels
            .iter()
            .filter_map(|kind| Channel::from_kind(*kind, self.alerts.webhook_url.as_deref()))
            .collect()
    }

    /// Interval between cycles. Saturates instead of overflowing; `validate`
    /// rejects values that would.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_minutes.saturating_mul(60))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.schedule.error_backoff_seconds)
    }

    pub fn skill_timeout(&self) -> Duration {
        Duration::from_secs(self.skills.timeout_seconds)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alerts.cooldown_seconds)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alerts.timeout_seconds)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config {
            general: GeneralConfig {
                target_url: "https://your-store.example.com".to_string(),
                ..GeneralConfig::default()
            },
            ..Config::default()
        };
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
