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

//! Relay Controller.
//!
//! Owns the staged channel selection and routes relay changes either to the
//! remote service (Real) or straight into the store (Virtual, Probing).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sem_types::{Channel, ChannelSet, RelayState};
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::mode::ModeCell;
use crate::store::LocalStateStore;
use crate::traits::{TelemetryApi, bounded};

/// What a relay reset actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOutcome {
    pub relays: RelayState,
    /// `false` when the remote command failed or was never sent
    pub remote_acknowledged: bool,
}

pub struct RelayController {
    api: Arc<dyn TelemetryApi>,
    store: Arc<LocalStateStore>,
    mode: ModeCell,
    timeout: Duration,
    selection: Mutex<ChannelSet>,
}

impl std::fmt::Debug for RelayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayController")
            .field("selection", &*self.selection.lock())
            .finish_non_exhaustive()
    }
}

impl RelayController {
    pub fn new(
        api: Arc<dyn TelemetryApi>,
        store: Arc<LocalStateStore>,
        mode: ModeCell,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            store,
            mode,
            timeout,
            selection: Mutex::new(ChannelSet::new()),
        }
    }

    /// Flip one channel in the staged selection; returns whether it is now selected.
    pub fn toggle(&self, channel: Channel) -> bool {
        self.selection.lock().toggle(channel)
    }

    /// Replace the staged selection.
    pub fn select(&self, channels: ChannelSet) {
        *self.selection.lock() = channels;
    }

    pub fn selection(&self) -> ChannelSet {
        self.selection.lock().clone()
    }

    pub fn clear_selection(&self) {
        self.selection.lock().clear();
    }

    /// Drive the relays into `desired`.
    ///
    /// In Real mode the store is only updated after the remote acknowledges;
    /// a failed command downgrades the mode and leaves the store untouched.
    pub async fn apply(&self, desired: RelayState) -> EngineResult<RelayState> {
        if self.mode.current().is_real() {
            let result = bounded(
                self.timeout,
                "relay/update",
                self.api.update_relays(&desired),
            )
            .await;
            if let Err(e) = result {
                self.mode.downgrade(&e.to_string());
                return Err(e);
            }
            info!("🎛️ [RELAY] Remote acknowledged [{}]", desired);
        } else {
            info!("🎛️ [RELAY] Applied locally [{}]", desired);
        }
        self.store.set_relay_state(desired.clone())?;
        Ok(desired)
    }

    /// Switch `channels` on, keeping every other relay as it is.
    ///
    /// In Real mode the other relays are taken from a fresh `relay/status`,
    /// never from the local copy.
    pub async fn activate(&self, channels: &ChannelSet) -> EngineResult<RelayState> {
        let mut desired = if self.mode.current().is_real() {
            match bounded(self.timeout, "relay/status", self.api.relay_status()).await {
                Ok(current) => current,
                Err(e) => {
                    self.mode.downgrade(&e.to_string());
                    return Err(e);
                }
            }
        } else {
            self.store.relay_state()
        };
        for channel in channels.iter() {
            desired.set(channel, true);
        }
        self.apply(desired).await
    }

    /// Switch every relay off.
    ///
    /// Best effort towards the remote: a failed command downgrades the mode,
    /// but the local all-off state is applied regardless.
    pub async fn reset(&self) -> EngineResult<ResetOutcome> {
        let mut remote_acknowledged = false;
        if self.mode.current().is_real() {
            match bounded(self.timeout, "relay/reset", self.api.reset_relays()).await {
                Ok(()) => remote_acknowledged = true,
                Err(e) => {
                    warn!("🎛️ [RELAY] Remote reset failed, resetting locally: {}", e);
                    self.mode.downgrade(&e.to_string());
                }
            }
        }
        let relays = RelayState::all_off();
        self.store.set_relay_state(relays.clone())?;
        info!(
            "🎛️ [RELAY] All relays off (remote acknowledged: {})",
            remote_acknowledged
        );
        Ok(ResetOutcome {
            relays,
            remote_acknowledged,
        })
    }
}
