// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Solar ESS Manager (SEM).
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sem_core::{AdvisorConfig, DEFAULT_STATE_PATH, EngineConfig, ProbePolicy};
use sem_types::{Channel, WATT_PER_CHANNEL};

/// Application configuration, loaded from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote service endpoints
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Probe, poll and command timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Local state file
    #[serde(default)]
    pub store: StoreConfig,

    /// What counts as a successful probe
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Local optimal-channel computation
    #[serde(default)]
    pub advisor: AdvisorSection,

    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// REST base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Websocket URL (derived from `base_url` when unset)
    #[serde(default)]
    pub push_url: Option<String>,

    /// Attempts per idempotent request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            push_url: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_owned()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Only used while Real with no push subscription
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for every remote command
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_interval_secs: default_probe_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_probe_timeout_ms() -> u64 {
    2500
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_command_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,

    /// Keep state in memory only (nothing survives a restart)
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            in_memory: false,
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbePolicyKind {
    #[default]
    AnyResponse,
    MaxAge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub policy: ProbePolicyKind,

    /// Only read with `policy = "max-age"`
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            policy: ProbePolicyKind::AnyResponse,
            max_age_secs: default_max_age_secs(),
        }
    }
}

fn default_max_age_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorSection {
    #[serde(default = "default_battery_capacity_wh")]
    pub battery_capacity_wh: f64,

    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: f64,

    /// SOC (%) below which nothing may be sold
    #[serde(default = "default_battery_protection_threshold")]
    pub battery_protection_threshold: f64,

    /// Per-channel consumption (W), keyed "A".."D"
    #[serde(default = "default_channel_power_w")]
    pub channel_power_w: BTreeMap<String, f64>,
}

impl Default for AdvisorSection {
    fn default() -> Self {
        Self {
            battery_capacity_wh: default_battery_capacity_wh(),
            duration_minutes: default_duration_minutes(),
            battery_protection_threshold: default_battery_protection_threshold(),
            channel_power_w: default_channel_power_w(),
        }
    }
}

fn default_battery_capacity_wh() -> f64 {
    5000.0
}

fn default_duration_minutes() -> f64 {
    60.0
}

fn default_battery_protection_threshold() -> f64 {
    20.0
}

fn default_channel_power_w() -> BTreeMap<String, f64> {
    Channel::ALL
        .into_iter()
        .map(|c| (c.as_str().to_owned(), WATT_PER_CHANNEL))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Where the configuration came from, reported once logging is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
}

impl AppConfig {
    /// Load `path`, falling back to defaults when it does not exist.
    ///
    /// Environment overrides are applied on top, then the result is validated.
    pub fn load(path: &Path) -> Result<(Self, ConfigSource)> {
        let (mut config, source) = match std::fs::read_to_string(path) {
            Ok(text) => {
                let config: AppConfig = toml::from_str(&text)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                (config, ConfigSource::File(path.to_path_buf()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), ConfigSource::Defaults(path.to_path_buf()))
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok((config, source))
    }

    /// Apply `SEM_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SEM_REMOTE_URL") {
            self.remote.base_url = url;
        }
        if let Some(url) = lookup("SEM_PUSH_URL") {
            self.remote.push_url = Some(url);
        }
        if let Some(path) = lookup("SEM_STATE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("SEM_LOG_LEVEL") {
            self.system.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base = &self.remote.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!("remote.base_url must be an http(s) URL, got '{}'", base);
        }
        if let Some(push) = &self.remote.push_url
            && !(push.starts_with("ws://") || push.starts_with("wss://"))
        {
            anyhow::bail!("remote.push_url must be a ws(s) URL, got '{}'", push);
        }
        if self.remote.max_retries == 0 {
            anyhow::bail!("remote.max_retries must be at least 1");
        }

        let timing = &self.timing;
        for (name, value) in [
            ("timing.probe_timeout_ms", timing.probe_timeout_ms),
            ("timing.probe_interval_secs", timing.probe_interval_secs),
            ("timing.poll_interval_secs", timing.poll_interval_secs),
            ("timing.command_timeout_ms", timing.command_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.probe.policy == ProbePolicyKind::MaxAge && self.probe.max_age_secs == 0 {
            anyhow::bail!("probe.max_age_secs must be greater than zero");
        }

        let advisor = &self.advisor;
        if !(advisor.battery_capacity_wh.is_finite() && advisor.battery_capacity_wh > 0.0) {
            anyhow::bail!("advisor.battery_capacity_wh must be positive");
        }
        if !(advisor.duration_minutes.is_finite() && advisor.duration_minutes > 0.0) {
            anyhow::bail!("advisor.duration_minutes must be positive");
        }
        if !(0.0..=100.0).contains(&advisor.battery_protection_threshold) {
            anyhow::bail!(
                "advisor.battery_protection_threshold ({}) must be within 0-100",
                advisor.battery_protection_threshold
            );
        }
        for (key, watts) in &advisor.channel_power_w {
            key.parse::<Channel>()
                .with_context(|| format!("advisor.channel_power_w has unknown key '{}'", key))?;
            if !(watts.is_finite() && *watts >= 0.0) {
                anyhow::bail!("advisor.channel_power_w.{} must be non-negative", key);
            }
        }

        match self.system.log_level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => anyhow::bail!("system.log_level '{}' is not a log level", other),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.command_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.remote.retry_delay_ms)
    }
}

/// Convert AppConfig to the engine's EngineConfig. Call `validate` first.
impl From<AppConfig> for EngineConfig {
    fn from(app: AppConfig) -> Self {
        let probe_policy = match app.probe.policy {
            ProbePolicyKind::AnyResponse => ProbePolicy::AnyResponse,
            ProbePolicyKind::MaxAge => {
                ProbePolicy::MaxAge(Duration::from_secs(app.probe.max_age_secs))
            }
        };

        let mut channel_power_w = AdvisorConfig::default().channel_power_w;
        for (key, watts) in &app.advisor.channel_power_w {
            if let Ok(channel) = key.parse::<Channel>() {
                channel_power_w.insert(channel, *watts);
            }
        }

        EngineConfig {
            store_path: (!app.store.in_memory).then_some(app.store.path),
            probe_timeout: Duration::from_millis(app.timing.probe_timeout_ms),
            probe_interval: Duration::from_secs(app.timing.probe_interval_secs),
            poll_interval: Duration::from_secs(app.timing.poll_interval_secs),
            command_timeout: Duration::from_millis(app.timing.command_timeout_ms),
            probe_policy,
            advisor: AdvisorConfig {
                battery_capacity_wh: app.advisor.battery_capacity_wh,
                duration_minutes: app.advisor.duration_minutes,
                battery_protection_threshold: app.advisor.battery_protection_threshold,
                channel_power_w,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.remote.base_url, "http://localhost:5000");
        assert_eq!(config.timing.probe_timeout_ms, 2500);
        assert_eq!(config.timing.poll_interval_secs, 15);
        assert_eq!(config.probe.policy, ProbePolicyKind::AnyResponse);

        // Validation should pass on default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_converts_to_engine_default() {
        let engine = EngineConfig::from(AppConfig::default());
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [remote]
            base_url = "http://10.0.0.5:5000"

            [probe]
            policy = "max-age"
            max_age_secs = 120

            [advisor.channel_power_w]
            B = 250.0
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.probe_interval_secs, 10);
        let engine = EngineConfig::from(config);
        assert_eq!(
            engine.probe_policy,
            ProbePolicy::MaxAge(Duration::from_secs(120))
        );
        assert!((engine.advisor.channel_power_w[&Channel::B] - 250.0).abs() < f64::EPSILON);
        assert!((engine.advisor.channel_power_w[&Channel::A] - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "SEM_REMOTE_URL" => Some("https://sem.example:8443".to_owned()),
            "SEM_STATE_PATH" => Some("/var/lib/sem/state.json".to_owned()),
            _ => None,
        });

        assert_eq!(config.remote.base_url, "https://sem.example:8443");
        assert_eq!(config.store.path, PathBuf::from("/var/lib/sem/state.json"));
        assert_eq!(config.system.log_level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.remote.push_url = Some("http://localhost:5000/ws".to_owned());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.timing.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.advisor.battery_protection_threshold = 120.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.advisor.channel_power_w.insert("E".to_owned(), 10.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_in_memory_store() {
        let mut config = AppConfig::default();
        config.store.in_memory = true;
        assert_eq!(EngineConfig::from(config).store_path, None);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (config, source) = AppConfig::load(&path).unwrap();
        assert_eq!(source, ConfigSource::Defaults(path));
        assert_eq!(config.timing.command_timeout_ms, 5000);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timing\nprobe_timeout_ms = ").unwrap();
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        // Deserialize back
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }
}
