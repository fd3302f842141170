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

//! In-process collaborators with scripted behaviour.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sem_core::{EngineConfig, PushSource, PushSubscription, TelemetryApi};
use sem_types::{ChannelSet, PushEvent, RelayState, TelemetryReading, TelemetrySample};
use tokio::sync::mpsc;

pub fn sample(soc: f64, solar: f64) -> TelemetrySample {
    TelemetrySample::new(soc, solar, 15_000.0, Utc::now()).unwrap()
}

/// Fast timings so loop behaviour shows up within a test
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        store_path: None,
        probe_timeout: Duration::from_millis(200),
        probe_interval: Duration::from_millis(60),
        poll_interval: Duration::from_millis(30),
        command_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    }
}

pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

#[derive(Debug)]
pub struct ScriptedApi {
    pub online: AtomicBool,
    pub fail_commands: AtomicBool,
    pub telemetry: Mutex<TelemetrySample>,
    pub relays: Mutex<RelayState>,
    pub commands: AtomicUsize,
    pub optimal: Mutex<Option<ChannelSet>>,
    pub hourly: Mutex<Vec<TelemetrySample>>,
    pub submitted: Mutex<Vec<TelemetryReading>>,
}

impl ScriptedApi {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            fail_commands: AtomicBool::new(false),
            telemetry: Mutex::new(sample(72.0, 350.0)),
            relays: Mutex::new(RelayState::all_off()),
            commands: AtomicUsize::new(0),
            optimal: Mutex::new(None),
            hourly: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        let api = Self::online();
        api.set_online(false);
        api
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }

    fn command(&self) -> Result<()> {
        self.reachable()?;
        if self.fail_commands.load(Ordering::SeqCst) {
            bail!("HTTP 500: relay controller offline");
        }
        self.commands.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TelemetryApi for ScriptedApi {
    async fn latest_telemetry(&self) -> Result<TelemetrySample> {
        self.reachable()?;
        Ok(self.telemetry.lock().clone())
    }

    async fn hourly_telemetry(&self, hours: u32) -> Result<Vec<TelemetrySample>> {
        self.reachable()?;
        let all = self.hourly.lock().clone();
        Ok(all.into_iter().take(hours as usize).collect())
    }

    async fn submit_telemetry(&self, reading: &TelemetryReading) -> Result<()> {
        self.command()?;
        self.submitted.lock().push(*reading);
        Ok(())
    }

    async fn relay_status(&self) -> Result<RelayState> {
        self.reachable()?;
        Ok(self.relays.lock().clone())
    }

    async fn update_relays(&self, desired: &RelayState) -> Result<()> {
        self.command()?;
        *self.relays.lock() = desired.clone();
        Ok(())
    }

    async fn reset_relays(&self) -> Result<()> {
        self.command()?;
        *self.relays.lock() = RelayState::all_off();
        Ok(())
    }

    async fn optimal_channels(&self, _target_watt: f64) -> Result<ChannelSet> {
        self.reachable()?;
        match self.optimal.lock().clone() {
            Some(channels) => Ok(channels),
            None => bail!("HTTP 404: no recommendation"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedPush {
    sender: Mutex<Option<mpsc::Sender<PushEvent>>>,
    pub refuse: AtomicBool,
    pub subscriptions: AtomicUsize,
}

impl ScriptedPush {
    pub fn is_subscribed(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub async fn emit(&self, event: PushEvent) {
        let sender = self.sender.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    pub fn cut(&self) {
        self.sender.lock().take();
    }
}

#[async_trait]
impl PushSource for ScriptedPush {
    async fn subscribe(&self) -> Result<PushSubscription> {
        if self.refuse.load(Ordering::SeqCst) {
            bail!("websocket handshake refused");
        }
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(PushSubscription::new(rx))
    }
}
