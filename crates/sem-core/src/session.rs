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

//! The owned session.
//!
//! Every component is built here and wired to the same store and mode flag.
//! Presentation surfaces talk to the session only; nothing is global.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use sem_types::{
    Channel, ChannelSet, ConnectionMode, RelayState, TelemetryReading, TelemetrySample,
    TradeQuote, TradeRecord,
};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::advisor::{Advice, AdviceSource, LocalAdvisor};
use crate::config::EngineConfig;
use crate::data_source::{DataSource, DataSourceTiming};
use crate::error::{EngineResult, ValidationError};
use crate::history::{self, HistoryFilter};
use crate::live::LiveUpdateChannel;
use crate::mode::ModeCell;
use crate::prober::{ConnectionProber, ProbeOutcome};
use crate::relay::{RelayController, ResetOutcome};
use crate::store::{LocalStateStore, StoreSnapshot};
use crate::trading::TradingEngine;
use crate::traits::{PushSource, TelemetryApi, bounded};

pub struct Session {
    config: EngineConfig,
    api: Arc<dyn TelemetryApi>,
    push: Arc<dyn PushSource>,
    store: Arc<LocalStateStore>,
    mode: ModeCell,
    prober: ConnectionProber,
    relays: Arc<RelayController>,
    trading: TradingEngine,
    advisor: LocalAdvisor,
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode.current())
            .field("store", &self.store.path())
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open the store and wire every component. Nothing remote happens yet.
    pub fn init(
        config: EngineConfig,
        api: Arc<dyn TelemetryApi>,
        push: Arc<dyn PushSource>,
    ) -> EngineResult<Self> {
        let store = Arc::new(match &config.store_path {
            Some(path) => LocalStateStore::open(path)?,
            None => LocalStateStore::in_memory(),
        });
        let mode = ModeCell::new();
        let prober = ConnectionProber::new(
            api.clone(),
            store.clone(),
            mode.clone(),
            config.probe_timeout,
            config.probe_policy,
        );
        let relays = Arc::new(RelayController::new(
            api.clone(),
            store.clone(),
            mode.clone(),
            config.command_timeout,
        ));
        let trading = TradingEngine::new(store.clone(), relays.clone());
        let advisor = LocalAdvisor::new(config.advisor.clone());

        Ok(Self {
            config,
            api,
            push,
            store,
            mode,
            prober,
            relays,
            trading,
            advisor,
            shutdown: Arc::new(Notify::new()),
            task: None,
        })
    }

    /// Resolve the initial mode and spawn the data source loop.
    pub async fn start(&mut self) -> ProbeOutcome {
        let outcome = self.probe_now().await;
        if self.task.is_some() {
            return outcome;
        }

        let live = LiveUpdateChannel::new(
            self.push.clone(),
            self.store.clone(),
            self.mode.clone(),
            self.config.command_timeout,
        );
        let source = DataSource::new(
            self.prober.clone(),
            live,
            self.api.clone(),
            self.store.clone(),
            self.mode.clone(),
            DataSourceTiming {
                probe_interval: self.config.probe_interval,
                poll_interval: self.config.poll_interval,
                command_timeout: self.config.command_timeout,
            },
        );
        self.task = Some(tokio::spawn(source.run(self.shutdown.clone())));
        info!("🚀 [SESSION] Started in {} mode", self.mode.current());
        outcome
    }

    /// Stop the data source loop and drop the push subscription.
    pub async fn teardown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.shutdown.notify_one();
        if let Err(e) = task.await {
            warn!("🚀 [SESSION] Data source task ended abnormally: {}", e);
        }
        info!("🚀 [SESSION] Torn down");
    }

    pub async fn probe_now(&self) -> ProbeOutcome {
        self.prober.probe().await
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode.current()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<ConnectionMode> {
        self.mode.subscribe()
    }

    pub fn store(&self) -> &Arc<LocalStateStore> {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    // ---- selection and relays ----

    pub fn toggle_channel(&self, channel: Channel) -> bool {
        self.relays.toggle(channel)
    }

    pub fn select_channels(&self, channels: ChannelSet) {
        self.relays.select(channels);
    }

    pub fn selection(&self) -> ChannelSet {
        self.relays.selection()
    }

    pub fn clear_selection(&self) {
        self.relays.clear_selection();
    }

    pub async fn apply_relays(&self, desired: RelayState) -> EngineResult<RelayState> {
        self.relays.apply(desired).await
    }

    // ---- trading ----

    pub fn quote(&self, channels: &ChannelSet) -> TradeQuote {
        self.trading.quote(channels)
    }

    pub async fn sell(&self, channels: &ChannelSet) -> EngineResult<TradeRecord> {
        self.trading.sell(channels).await
    }

    pub async fn sell_selection(&self) -> EngineResult<TradeRecord> {
        self.trading.sell_selection().await
    }

    pub async fn reset(&self) -> EngineResult<ResetOutcome> {
        self.trading.reset().await
    }

    pub fn clear_history(&self) -> EngineResult<usize> {
        self.trading.clear_history()
    }

    // ---- advisor ----

    /// Recommended channels for `target_watt`.
    ///
    /// Real mode asks the remote advisor first; any failure there falls back
    /// to the local computation without touching the mode.
    pub async fn advise(&self, target_watt: f64) -> EngineResult<Advice> {
        if self.mode.current().is_real() {
            match bounded(
                self.config.command_timeout,
                "channels/optimal",
                self.api.optimal_channels(target_watt),
            )
            .await
            {
                Ok(channels) => {
                    return Ok(Advice {
                        channels,
                        source: AdviceSource::Remote,
                    });
                }
                Err(e) => debug!("🧮 [ADVISOR] Remote advisor failed, using local: {}", e),
            }
        }
        let sample = self.require_telemetry()?;
        let channels = self.advisor.optimal_channels(&sample, target_watt)?;
        Ok(Advice {
            channels,
            source: AdviceSource::Local,
        })
    }

    /// Which channels can still be sold next to the staged selection.
    pub fn available_channels(&self) -> EngineResult<BTreeMap<Channel, bool>> {
        let sample = self.require_telemetry()?;
        Ok(self
            .advisor
            .available_channels(&sample, &self.relays.selection())?)
    }

    fn require_telemetry(&self) -> Result<TelemetrySample, ValidationError> {
        self.store.telemetry().ok_or_else(|| {
            ValidationError::InvalidInput("no telemetry sample available".to_owned())
        })
    }

    // ---- history ----

    pub fn history(&self, filter: &HistoryFilter) -> Vec<TradeRecord> {
        filter.apply(&self.store.trade_history())
    }

    pub fn export_history_csv<W: Write>(
        &self,
        filter: &HistoryFilter,
        writer: W,
    ) -> csv::Result<usize> {
        let records = self.history(filter);
        history::write_csv(&records, writer)?;
        Ok(records.len())
    }

    // ---- telemetry ----

    /// Hourly samples from the remote; Virtual mode answers with the last
    /// local snapshot only.
    pub async fn hourly_telemetry(&self, hours: u32) -> EngineResult<Vec<TelemetrySample>> {
        if self.mode.current().is_real() {
            match bounded(
                self.config.command_timeout,
                "telemetry/hourly",
                self.api.hourly_telemetry(hours),
            )
            .await
            {
                Ok(samples) => return Ok(samples),
                Err(e) => {
                    self.mode.downgrade(&e.to_string());
                }
            }
        }
        Ok(self.store.telemetry().into_iter().collect())
    }

    /// Submit a reading. Real mode posts upstream before mirroring locally.
    pub async fn submit_telemetry(
        &self,
        reading: TelemetryReading,
    ) -> EngineResult<TelemetrySample> {
        reading.validate()?;
        if self.mode.current().is_real() {
            let result = bounded(
                self.config.command_timeout,
                "telemetry submit",
                self.api.submit_telemetry(&reading),
            )
            .await;
            if let Err(e) = result {
                self.mode.downgrade(&e.to_string());
                return Err(e);
            }
        }
        let sample = reading.at(Utc::now());
        self.store.set_telemetry(sample.clone())?;
        Ok(sample)
    }

    // ---- manual overrides ----

    pub fn set_energy_balance(&self, watts: f64) -> EngineResult<()> {
        self.store.set_energy_balance(watts)
    }

    pub fn set_cash_balance(&self, amount: i64) -> EngineResult<()> {
        self.store.set_cash_balance(amount)
    }

    pub fn set_ledger_entry(&self, channel: Channel, watts: f64) -> EngineResult<()> {
        self.store.set_ledger_entry(channel, watts)
    }

    pub fn restore_defaults(&self) -> EngineResult<()> {
        self.store.restore_defaults()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
