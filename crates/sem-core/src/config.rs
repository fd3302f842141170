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

//! Engine configuration.
//!
//! The binary builds this from its TOML file; tests construct it directly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use sem_types::{Channel, WATT_PER_CHANNEL};

/// Default path for the persisted state file.
/// Relative so the same layout works from a checkout and from a service dir.
pub const DEFAULT_STATE_PATH: &str = "./data/sem_state.json";

/// What counts as a successful probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbePolicy {
    /// Any decodable telemetry response means Real
    #[default]
    AnyResponse,
    /// The returned sample must also be younger than the given age
    MaxAge(Duration),
}

/// Inputs for the local optimal-channel computation
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorConfig {
    pub battery_capacity_wh: f64,
    /// How long the sold power must be sustainable
    pub duration_minutes: f64,
    /// Below this SOC (%) nothing may be sold
    pub battery_protection_threshold: f64,
    /// Consumption per channel (W)
    pub channel_power_w: BTreeMap<Channel, f64>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            battery_capacity_wh: 5000.0,
            duration_minutes: 60.0,
            battery_protection_threshold: 20.0,
            channel_power_w: Channel::ALL
                .into_iter()
                .map(|c| (c, WATT_PER_CHANNEL))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// `None` keeps the store in memory only
    pub store_path: Option<PathBuf>,
    pub probe_timeout: Duration,
    pub probe_interval: Duration,
    /// Steady-state poll used only when no push subscription is live
    pub poll_interval: Duration,
    /// Upper bound for every remote command and query
    pub command_timeout: Duration,
    pub probe_policy: ProbePolicy,
    pub advisor: AdvisorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: Some(PathBuf::from(DEFAULT_STATE_PATH)),
            probe_timeout: Duration::from_millis(2500),
            probe_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(15),
            command_timeout: Duration::from_secs(5),
            probe_policy: ProbePolicy::AnyResponse,
            advisor: AdvisorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with an in-memory store.
    pub fn in_memory() -> Self {
        Self {
            store_path: None,
            ..Self::default()
        }
    }
}
