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

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::client::RemoteClient;
use crate::push::WebSocketPush;
use sem_core::{PushSource, PushSubscription, TelemetryApi};
use sem_types::{ChannelSet, RelayState, TelemetryReading, TelemetrySample};

/// REST adapter implementing TelemetryApi
#[derive(Debug, Clone)]
pub struct RemoteTelemetryApi {
    client: Arc<RemoteClient>,
}

impl RemoteTelemetryApi {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryApi for RemoteTelemetryApi {
    async fn latest_telemetry(&self) -> Result<TelemetrySample> {
        self.client
            .latest_telemetry()
            .await
            .context("Failed to fetch latest telemetry")
    }

    async fn hourly_telemetry(&self, hours: u32) -> Result<Vec<TelemetrySample>> {
        self.client
            .hourly_telemetry(hours)
            .await
            .with_context(|| format!("Failed to fetch {} hours of telemetry", hours))
    }

    async fn submit_telemetry(&self, reading: &TelemetryReading) -> Result<()> {
        self.client
            .submit_telemetry(reading)
            .await
            .context("Failed to submit telemetry")
    }

    async fn relay_status(&self) -> Result<RelayState> {
        self.client
            .relay_status()
            .await
            .context("Failed to read relay status")
    }

    async fn update_relays(&self, desired: &RelayState) -> Result<()> {
        self.client
            .update_relays(desired)
            .await
            .with_context(|| format!("Failed to command relays [{}]", desired))
    }

    async fn reset_relays(&self) -> Result<()> {
        self.client
            .reset_relays()
            .await
            .context("Failed to reset relays")
    }

    async fn optimal_channels(&self, target_watt: f64) -> Result<ChannelSet> {
        let channels = self
            .client
            .optimal_channels(target_watt)
            .await
            .with_context(|| format!("Failed to fetch optimal channels for {} W", target_watt))?;
        debug!("✅ [ADAPTER] Optimal for {} W: {}", target_watt, channels);
        Ok(channels)
    }
}

#[async_trait]
impl PushSource for WebSocketPush {
    async fn subscribe(&self) -> Result<PushSubscription> {
        self.connect()
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::time::Duration;

    #[tokio::test]
    async fn test_adapter_adds_context() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/relay/reset")
            .with_status(503)
            .with_body(r#"{"message": "relay board offline"}"#)
            .create_async()
            .await;

        let client = RemoteClient::new(server.url(), Duration::from_secs(1))
            .unwrap()
            .with_retry_config(1, Duration::from_millis(1));
        let api = RemoteTelemetryApi::new(Arc::new(client));

        let err = api.reset_relays().await.unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.starts_with("Failed to reset relays"));
        assert!(rendered.contains("relay board offline"));
    }
}
