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

//! Live Update Channel.
//!
//! Holds the push subscription while the session is Real and merges every
//! event into the store in arrival order. Losing the transport downgrades the
//! mode; reconnection is left to the next successful probe.

use std::sync::Arc;
use std::time::Duration;

use sem_types::PushEvent;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::mode::ModeCell;
use crate::store::LocalStateStore;
use crate::traits::{PushSource, PushSubscription, bounded};

pub struct LiveUpdateChannel {
    source: Arc<dyn PushSource>,
    store: Arc<LocalStateStore>,
    mode: ModeCell,
    connect_timeout: Duration,
    subscription: Option<PushSubscription>,
}

impl std::fmt::Debug for LiveUpdateChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveUpdateChannel")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl LiveUpdateChannel {
    pub fn new(
        source: Arc<dyn PushSource>,
        store: Arc<LocalStateStore>,
        mode: ModeCell,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            source,
            store,
            mode,
            connect_timeout,
            subscription: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe if the session is Real and no subscription is live.
    pub async fn connect(&mut self) -> EngineResult<()> {
        if self.is_connected() || !self.mode.current().is_real() {
            return Ok(());
        }
        let subscription =
            bounded(self.connect_timeout, "push subscribe", self.source.subscribe()).await?;
        self.subscription = Some(subscription);
        info!("📡 [LIVE] Push subscription connected");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.subscription.take().is_some() {
            info!("📡 [LIVE] Push subscription closed");
        }
    }

    /// Wait for the next event.
    ///
    /// Never resolves while disconnected. Returns `None` once when the
    /// transport is lost, after downgrading the mode.
    pub async fn next_event(&mut self) -> Option<PushEvent> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        if let Some(event) = subscription.recv().await {
            return Some(event);
        }
        self.subscription = None;
        self.mode.downgrade("push transport lost");
        None
    }

    /// Merge one event into the store, last write wins per field.
    pub fn apply_event(&self, event: PushEvent) -> EngineResult<()> {
        match event {
            PushEvent::Telemetry(sample) => {
                debug!(
                    "📡 [LIVE] Telemetry: soc={:.1}% solar={:.0} W lux={:.0}",
                    sample.state_of_charge_percent,
                    sample.solar_power_watts,
                    sample.illuminance_lux
                );
                self.store.set_telemetry(sample)
            }
            PushEvent::RelayStatus(delta) => {
                if delta.is_empty() {
                    warn!("📡 [LIVE] Ignoring empty relay status update");
                    return Ok(());
                }
                let merged = self.store.merge_relay_delta(&delta)?;
                debug!("📡 [LIVE] Relays now [{}]", merged);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePush, sample};
    use sem_types::{Channel, ConnectionMode, RelayDelta};

    fn channel(
        push: &Arc<FakePush>,
        store: &Arc<LocalStateStore>,
        mode: &ModeCell,
    ) -> LiveUpdateChannel {
        LiveUpdateChannel::new(
            push.clone(),
            store.clone(),
            mode.clone(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_connect_only_in_real_mode() {
        let push = Arc::new(FakePush::default());
        let store = Arc::new(LocalStateStore::in_memory());
        let mode = ModeCell::new();
        let mut live = channel(&push, &store, &mode);

        live.connect().await.unwrap();
        assert!(!live.is_connected());

        mode.set(ConnectionMode::Real);
        live.connect().await.unwrap();
        assert!(live.is_connected());
    }

    #[tokio::test]
    async fn test_events_merge_into_store() {
        let push = Arc::new(FakePush::default());
        let store = Arc::new(LocalStateStore::in_memory());
        let mode = ModeCell::new();
        mode.set(ConnectionMode::Real);
        let mut live = channel(&push, &store, &mode);
        live.connect().await.unwrap();

        push.send(PushEvent::Telemetry(sample(81.0))).await;
        push.send(PushEvent::RelayStatus(RelayDelta::from_iter([(Channel::D, true)])))
            .await;

        for _ in 0..2 {
            let event = live.next_event().await.unwrap();
            live.apply_event(event).unwrap();
        }

        let telemetry = store.telemetry().unwrap();
        assert!((telemetry.state_of_charge_percent - 81.0).abs() < f64::EPSILON);
        assert!(store.relay_state().is_on(Channel::D));
    }

    #[tokio::test]
    async fn test_transport_loss_downgrades() {
        let push = Arc::new(FakePush::default());
        let store = Arc::new(LocalStateStore::in_memory());
        let mode = ModeCell::new();
        mode.set(ConnectionMode::Real);
        let mut live = channel(&push, &store, &mode);
        live.connect().await.unwrap();

        push.drop_transport();

        assert!(live.next_event().await.is_none());
        assert!(!live.is_connected());
        assert_eq!(mode.current(), ConnectionMode::Virtual);
    }
}
