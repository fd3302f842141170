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

//! Connection Prober.
//!
//! One bounded request against `telemetry/latest` decides the mode: success
//! means Real, failure or timeout means Virtual.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sem_types::{ConnectionMode, TelemetrySample};
use tracing::{debug, warn};

use crate::config::ProbePolicy;
use crate::mode::ModeCell;
use crate::store::LocalStateStore;
use crate::traits::{TelemetryApi, bounded};

/// Result of one probe
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Reachable(TelemetrySample),
    /// Reachable, but the sample is older than the max-age policy allows
    Stale {
        sample: TelemetrySample,
        age: Duration,
    },
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable(_))
    }
}

#[derive(Clone)]
pub struct ConnectionProber {
    api: Arc<dyn TelemetryApi>,
    store: Arc<LocalStateStore>,
    mode: ModeCell,
    timeout: Duration,
    policy: ProbePolicy,
}

impl std::fmt::Debug for ConnectionProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProber")
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ConnectionProber {
    pub fn new(
        api: Arc<dyn TelemetryApi>,
        store: Arc<LocalStateStore>,
        mode: ModeCell,
        timeout: Duration,
        policy: ProbePolicy,
    ) -> Self {
        Self {
            api,
            store,
            mode,
            timeout,
            policy,
        }
    }

    /// Probe once and move the mode flag accordingly.
    ///
    /// A reachable sample is mirrored into the store.
    pub async fn probe(&self) -> ProbeOutcome {
        let outcome = match bounded(
            self.timeout,
            "probe telemetry/latest",
            self.api.latest_telemetry(),
        )
        .await
        {
            Ok(sample) => self.classify(sample),
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        };

        match &outcome {
            ProbeOutcome::Reachable(sample) => {
                debug!(
                    "🔌 [PROBE] Remote reachable (soc={:.1}%, solar={:.0} W)",
                    sample.state_of_charge_percent, sample.solar_power_watts
                );
                if let Err(e) = self.store.set_telemetry(sample.clone()) {
                    warn!("🔌 [PROBE] Failed to mirror telemetry: {}", e);
                }
                self.mode.set(ConnectionMode::Real);
            }
            ProbeOutcome::Stale { age, .. } => {
                self.mode
                    .downgrade(&format!("latest sample is {}s old", age.as_secs()));
            }
            ProbeOutcome::Unreachable(reason) => {
                debug!("🔌 [PROBE] Remote unreachable: {}", reason);
                self.mode.downgrade(reason);
            }
        }

        outcome
    }

    fn classify(&self, sample: TelemetrySample) -> ProbeOutcome {
        let ProbePolicy::MaxAge(max_age) = self.policy else {
            return ProbeOutcome::Reachable(sample);
        };
        // A sample from the future counts as fresh.
        let age = sample.age(Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if age > max_age {
            ProbeOutcome::Stale { sample, age }
        } else {
            ProbeOutcome::Reachable(sample)
        }
    }
}
