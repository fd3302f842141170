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

//! Seams to the remote collaborator.
//!
//! The engine never talks HTTP or websockets itself; it consumes these traits
//! and maps any failure to a connectivity error.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sem_types::{ChannelSet, PushEvent, RelayState, TelemetryReading, TelemetrySample};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{EngineError, EngineResult};

/// Remote request/response surface
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    /// Most recent sample (`GET telemetry/latest`)
    async fn latest_telemetry(&self) -> Result<TelemetrySample>;

    /// Hourly samples for the last `hours` hours, oldest first
    async fn hourly_telemetry(&self, hours: u32) -> Result<Vec<TelemetrySample>>;

    /// Upsert a reading (`POST telemetry`)
    async fn submit_telemetry(&self, reading: &TelemetryReading) -> Result<()>;

    async fn relay_status(&self) -> Result<RelayState>;

    /// Command the relays into `desired`; Ok means the remote acknowledged
    async fn update_relays(&self, desired: &RelayState) -> Result<()>;

    async fn reset_relays(&self) -> Result<()>;

    /// Advisory recommendation for `target_watt`
    async fn optimal_channels(&self, target_watt: f64) -> Result<ChannelSet>;
}

/// Source of push subscriptions
#[async_trait]
pub trait PushSource: Send + Sync {
    async fn subscribe(&self) -> Result<PushSubscription>;
}

/// A live push subscription.
///
/// The stream ends (`recv` returns `None`) when the transport is lost.
/// Dropping the subscription tears down the transport task.
#[derive(Debug)]
pub struct PushSubscription {
    events: mpsc::Receiver<PushEvent>,
    task: Option<JoinHandle<()>>,
}

impl PushSubscription {
    pub fn new(events: mpsc::Receiver<PushEvent>) -> Self {
        Self { events, task: None }
    }

    /// Attach the task that feeds `events` so it is aborted with the subscription.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run one remote call under `limit`, mapping failure and timeout to
/// [`EngineError::Connectivity`].
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> EngineResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EngineError::connectivity(&e.context(what.to_owned()))),
        Err(_) => Err(EngineError::Connectivity(format!(
            "{what}: timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
