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

//! Unified data source.
//!
//! One loop owns every periodic concern: the probe tick, the push
//! subscription and the poll. Push is preferred for telemetry; while Real,
//! `relay/status` is pulled on entry and on every poll tick, and
//! `telemetry/latest` is polled only when no subscription is live.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::live::LiveUpdateChannel;
use crate::mode::ModeCell;
use crate::prober::ConnectionProber;
use crate::store::LocalStateStore;
use crate::traits::{TelemetryApi, bounded};

#[derive(Debug, Clone, Copy)]
pub struct DataSourceTiming {
    pub probe_interval: Duration,
    pub poll_interval: Duration,
    pub command_timeout: Duration,
}

pub struct DataSource {
    prober: ConnectionProber,
    live: LiveUpdateChannel,
    api: Arc<dyn TelemetryApi>,
    store: Arc<LocalStateStore>,
    mode: ModeCell,
    timing: DataSourceTiming,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("live", &self.live)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl DataSource {
    pub fn new(
        prober: ConnectionProber,
        live: LiveUpdateChannel,
        api: Arc<dyn TelemetryApi>,
        store: Arc<LocalStateStore>,
        mode: ModeCell,
        timing: DataSourceTiming,
    ) -> Self {
        Self {
            prober,
            live,
            api,
            store,
            mode,
            timing,
        }
    }

    /// Bring the push subscription in line with the current mode.
    pub async fn reconcile_live(&mut self) {
        if self.mode.current().is_real() {
            if !self.live.is_connected()
                && let Err(e) = self.live.connect().await
            {
                warn!("📡 [LIVE] Subscribe failed, polling instead: {}", e);
            }
        } else {
            self.live.disconnect();
        }
    }

    /// Pull relay status, plus latest telemetry when push is not live.
    ///
    /// Any connectivity failure downgrades the mode.
    pub async fn poll(&self) -> EngineResult<()> {
        let limit = self.timing.command_timeout;
        let with_telemetry = !self.live.is_connected();
        let result = async {
            let sample = if with_telemetry {
                Some(bounded(limit, "poll telemetry/latest", self.api.latest_telemetry()).await?)
            } else {
                None
            };
            let relays = bounded(limit, "poll relay/status", self.api.relay_status()).await?;
            if let Some(sample) = sample {
                self.store.set_telemetry(sample)?;
            }
            self.store.set_relay_state(relays)?;
            Ok::<(), EngineError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!("🔄 [POLL] Store refreshed from remote");
                Ok(())
            }
            Err(e) => {
                if e.is_connectivity() {
                    self.mode.downgrade(&e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn refresh_after_entering_real(&self) {
        if let Err(e) = self.poll().await {
            debug!("🔄 [POLL] Relay sync on entering real failed: {}", e);
        }
    }

    /// Drive the loop until `shutdown` is notified.
    ///
    /// The first probe fires after one probe interval; callers resolve the
    /// initial mode themselves.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        let start = Instant::now();
        let mut probe_tick =
            interval_at(start + self.timing.probe_interval, self.timing.probe_interval);
        probe_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll_tick =
            interval_at(start + self.timing.poll_interval, self.timing.poll_interval);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut mode_rx = self.mode.subscribe();

        let mut last_mode = self.mode.current();
        self.reconcile_live().await;
        if last_mode.is_real() {
            self.refresh_after_entering_real().await;
        }
        info!(
            "🔄 [DATA] Data source running (probe every {}s, poll every {}s)",
            self.timing.probe_interval.as_secs(),
            self.timing.poll_interval.as_secs()
        );

        loop {
            tokio::select! {
                () = shutdown.notified() => break,
                _ = probe_tick.tick() => {
                    self.prober.probe().await;
                    self.reconcile_live().await;
                }
                event = self.live.next_event() => match event {
                    Some(event) => {
                        if let Err(e) = self.live.apply_event(event) {
                            warn!("📡 [LIVE] Failed to store push event: {}", e);
                        }
                    }
                    None => info!("📡 [LIVE] Push stream ended, waiting for next probe"),
                },
                changed = mode_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let mode = *mode_rx.borrow_and_update();
                    debug!("🔄 [DATA] Mode is now {}", mode);
                    self.reconcile_live().await;
                    if mode.is_real() && !last_mode.is_real() {
                        self.refresh_after_entering_real().await;
                    }
                    last_mode = mode;
                }
                _ = poll_tick.tick(), if self.mode.current().is_real() => {
                    if let Err(e) = self.poll().await {
                        debug!("🔄 [POLL] Poll failed: {}", e);
                    }
                }
            }
        }

        self.live.disconnect();
        info!("🔄 [DATA] Data source stopped");
    }
}
