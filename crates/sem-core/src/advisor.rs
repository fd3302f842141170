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

//! Optimal-Channel Advisor, local fallback.
//!
//! Advisory only: nothing here gates or alters a sale.

use std::collections::BTreeMap;

use sem_types::{Channel, ChannelSet, TelemetrySample};
use serde::Serialize;
use tracing::debug;

use crate::config::AdvisorConfig;
use crate::error::ValidationError;

/// Where a recommendation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdviceSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub channels: ChannelSet,
    pub source: AdviceSource,
}

#[derive(Debug, Clone)]
pub struct LocalAdvisor {
    config: AdvisorConfig,
}

impl LocalAdvisor {
    pub fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    fn channel_power(&self, channel: Channel) -> f64 {
        self.config
            .channel_power_w
            .get(&channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Power sustainable for the configured duration: battery share plus PV.
    pub fn available_power(&self, sample: &TelemetrySample) -> Result<f64, ValidationError> {
        let soc = sample.state_of_charge_percent;
        if !(0.0..=100.0).contains(&soc) {
            return Err(ValidationError::OutOfRange {
                field: "stateOfCharge",
                value: soc,
            });
        }
        if !sample.solar_power_watts.is_finite() || sample.solar_power_watts < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "solarPowerWatts",
                value: sample.solar_power_watts,
            });
        }
        let hours = self.config.duration_minutes / 60.0;
        if hours <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "duration_minutes",
                value: self.config.duration_minutes,
            });
        }
        let battery_w = self.config.battery_capacity_wh * (soc / 100.0) / hours;
        Ok(battery_w + sample.solar_power_watts)
    }

    /// Largest channel combination whose power fits within
    /// `min(target_watt, available)`; ties go to the higher total power.
    pub fn optimal_channels(
        &self,
        sample: &TelemetrySample,
        target_watt: f64,
    ) -> Result<ChannelSet, ValidationError> {
        if target_watt.is_nan() || target_watt < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "target_watt",
                value: target_watt,
            });
        }
        let budget = self.available_power(sample)?.min(target_watt);

        let mut best: Option<(usize, f64, ChannelSet)> = None;
        for mask in 1_u8..(1_u8 << Channel::ALL.len()) {
            let combo: ChannelSet = Channel::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask & (1_u8 << i) != 0)
                .map(|(_, c)| c)
                .collect();
            let power: f64 = combo.iter().map(|c| self.channel_power(c)).sum();
            if power > budget {
                continue;
            }
            let better = match &best {
                None => true,
                Some((count, best_power, _)) => {
                    combo.len() > *count || (combo.len() == *count && power > *best_power)
                }
            };
            if better {
                best = Some((combo.len(), power, combo));
            }
        }

        let channels = best.map(|(_, _, combo)| combo).unwrap_or_default();
        debug!(
            "🧮 [ADVISOR] Budget {:.0} W → recommend {}",
            budget, channels
        );
        Ok(channels)
    }

    /// Per channel, whether it can still be sold next to `selected`.
    ///
    /// Everything is unavailable below the battery protection threshold.
    pub fn available_channels(
        &self,
        sample: &TelemetrySample,
        selected: &ChannelSet,
    ) -> Result<BTreeMap<Channel, bool>, ValidationError> {
        let available = self.available_power(sample)?;

        if sample.state_of_charge_percent < self.config.battery_protection_threshold {
            debug!(
                "🧮 [ADVISOR] SOC {:.1}% below protection threshold {:.1}%",
                sample.state_of_charge_percent, self.config.battery_protection_threshold
            );
            return Ok(Channel::ALL.into_iter().map(|c| (c, false)).collect());
        }

        let used: f64 = selected.iter().map(|c| self.channel_power(c)).sum();
        let remaining = available - used;

        Ok(Channel::ALL
            .into_iter()
            .map(|c| {
                let free = !selected.contains(c) && self.channel_power(c) <= remaining;
                (c, free)
            })
            .collect())
    }
}
