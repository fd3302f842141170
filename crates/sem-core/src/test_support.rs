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

//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sem_types::{ChannelSet, PushEvent, RelayState, TelemetryReading, TelemetrySample};
use tokio::sync::mpsc;

use crate::traits::{PushSource, PushSubscription, TelemetryApi};

pub fn sample(soc: f64) -> TelemetrySample {
    TelemetrySample::new(soc, 400.0, 20_000.0, Utc::now()).unwrap()
}

#[derive(Debug)]
pub struct FakeApi {
    pub online: AtomicBool,
    pub fail_commands: AtomicBool,
    pub telemetry: Mutex<TelemetrySample>,
    pub relays: Mutex<RelayState>,
    pub updates: Mutex<Vec<RelayState>>,
    pub resets: AtomicUsize,
    pub submitted: Mutex<Vec<TelemetryReading>>,
    pub optimal: Mutex<Option<ChannelSet>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            fail_commands: AtomicBool::new(false),
            telemetry: Mutex::new(sample(70.0)),
            relays: Mutex::new(RelayState::all_off()),
            updates: Mutex::new(Vec::new()),
            resets: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            optimal: Mutex::new(None),
        }
    }
}

impl FakeApi {
    pub fn offline() -> Self {
        let api = Self::default();
        api.online.store(false, Ordering::SeqCst);
        api
    }

    fn check_online(&self) -> Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }

    fn check_command(&self) -> Result<()> {
        self.check_online()?;
        if self.fail_commands.load(Ordering::SeqCst) {
            bail!("relay command rejected");
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryApi for FakeApi {
    async fn latest_telemetry(&self) -> Result<TelemetrySample> {
        self.check_online()?;
        Ok(self.telemetry.lock().clone())
    }

    async fn hourly_telemetry(&self, hours: u32) -> Result<Vec<TelemetrySample>> {
        self.check_online()?;
        let latest = self.telemetry.lock().clone();
        Ok(vec![latest; hours as usize])
    }

    async fn submit_telemetry(&self, reading: &TelemetryReading) -> Result<()> {
        self.check_command()?;
        self.submitted.lock().push(*reading);
        Ok(())
    }

    async fn relay_status(&self) -> Result<RelayState> {
        self.check_online()?;
        Ok(self.relays.lock().clone())
    }

    async fn update_relays(&self, desired: &RelayState) -> Result<()> {
        self.check_command()?;
        self.updates.lock().push(desired.clone());
        *self.relays.lock() = desired.clone();
        Ok(())
    }

    async fn reset_relays(&self) -> Result<()> {
        self.check_command()?;
        self.resets.fetch_add(1, Ordering::SeqCst);
        *self.relays.lock() = RelayState::all_off();
        Ok(())
    }

    async fn optimal_channels(&self, _target_watt: f64) -> Result<ChannelSet> {
        self.check_online()?;
        match self.optimal.lock().clone() {
            Some(channels) => Ok(channels),
            None => bail!("advisor unavailable"),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakePush {
    sender: Mutex<Option<mpsc::Sender<PushEvent>>>,
    pub fail_subscribe: AtomicBool,
    pub subscriptions: AtomicUsize,
}

impl FakePush {
    pub async fn send(&self, event: PushEvent) {
        let sender = self.sender.lock().clone();
        if let Some(sender) = sender {
            sender.send(event).await.unwrap();
        }
    }

    /// Simulate the transport going away.
    pub fn drop_transport(&self) {
        self.sender.lock().take();
    }
}

#[async_trait]
impl PushSource for FakePush {
    async fn subscribe(&self) -> Result<PushSubscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            bail!("websocket handshake failed");
        }
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(PushSubscription::new(rx))
    }
}
