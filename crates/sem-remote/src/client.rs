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

use crate::errors::{RemoteError, RemoteResult};
use crate::types::{HourlyBody, OptimalBody, error_message};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use sem_types::{
    ChannelSet, RelayState, TelemetryPayload, TelemetryReading, TelemetrySample,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LATEST_PATH: &str = "/api/telemetry/latest";
const HOURLY_PATH: &str = "/api/telemetry/hourly";
const SUBMIT_PATH: &str = "/api/telemetry";
const RELAY_STATUS_PATH: &str = "/api/relay/status";
const RELAY_UPDATE_PATH: &str = "/api/relay/update";
const RELAY_RESET_PATH: &str = "/api/relay/reset";
const OPTIMAL_PATH: &str = "/api/channels/optimal";

/// REST client for the telemetry/actuation service
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl RemoteClient {
    /// Create a client; `request_timeout` bounds every single HTTP attempt.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> RemoteResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RemoteError::ConfigError(format!(
                "remote URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RemoteError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Latest telemetry sample
    pub async fn latest_telemetry(&self) -> RemoteResult<TelemetrySample> {
        debug!("🔍 [REMOTE] GET {}", LATEST_PATH);
        let url = self.url(LATEST_PATH);
        let response = self.retry_request(|| self.client.get(&url)).await?;
        let payload: TelemetryPayload = Self::json(LATEST_PATH, response).await?;
        let sample = payload.decode()?;
        debug!(
            "✅ [REMOTE] Latest: soc={:.1}% solar={:.0} W at {}",
            sample.state_of_charge_percent, sample.solar_power_watts, sample.timestamp
        );
        Ok(sample)
    }

    /// Hourly samples for the last `hours` hours.
    ///
    /// Rows that fail to decode are skipped, not zero-filled.
    pub async fn hourly_telemetry(&self, hours: u32) -> RemoteResult<Vec<TelemetrySample>> {
        let path = format!("{}/{}", HOURLY_PATH, hours);
        debug!("🔍 [REMOTE] GET {}", path);
        let url = self.url(&path);
        let response = self.retry_request(|| self.client.get(&url)).await?;
        let body: HourlyBody = Self::json(&path, response).await?;

        let rows = body.into_rows();
        let total = rows.len();
        let samples: Vec<TelemetrySample> = rows
            .into_iter()
            .filter_map(|row| match row.decode() {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("⚠️ [REMOTE] Skipping hourly row: {}", e);
                    None
                }
            })
            .collect();
        debug!("✅ [REMOTE] Hourly: {}/{} rows usable", samples.len(), total);
        Ok(samples)
    }

    /// Upsert a reading. Sent once: the service appends rows.
    pub async fn submit_telemetry(&self, reading: &TelemetryReading) -> RemoteResult<()> {
        info!(
            "📤 [REMOTE] POST {} soc={:.1}% solar={:.0} W lux={:.0}",
            SUBMIT_PATH,
            reading.state_of_charge_percent,
            reading.solar_power_watts,
            reading.illuminance_lux
        );
        let response = self
            .client
            .post(self.url(SUBMIT_PATH))
            .json(reading)
            .send()
            .await
            .map_err(Self::map_transport)?;
        Self::ack(SUBMIT_PATH, response).await
    }

    pub async fn relay_status(&self) -> RemoteResult<RelayState> {
        debug!("🔍 [REMOTE] GET {}", RELAY_STATUS_PATH);
        let url = self.url(RELAY_STATUS_PATH);
        let response = self.retry_request(|| self.client.get(&url)).await?;
        Self::json(RELAY_STATUS_PATH, response).await
    }

    /// Command the full desired relay state.
    pub async fn update_relays(&self, desired: &RelayState) -> RemoteResult<()> {
        info!("🎛️ [REMOTE] POST {} [{}]", RELAY_UPDATE_PATH, desired);
        let url = self.url(RELAY_UPDATE_PATH);
        let response = self
            .retry_request(|| self.client.post(&url).json(desired))
            .await?;
        Self::ack(RELAY_UPDATE_PATH, response).await
    }

    pub async fn reset_relays(&self) -> RemoteResult<()> {
        info!("🎛️ [REMOTE] POST {}", RELAY_RESET_PATH);
        let url = self.url(RELAY_RESET_PATH);
        let response = self.retry_request(|| self.client.post(&url)).await?;
        Self::ack(RELAY_RESET_PATH, response).await
    }

    pub async fn optimal_channels(&self, target_watt: f64) -> RemoteResult<ChannelSet> {
        debug!("🔍 [REMOTE] GET {}?target_w={}", OPTIMAL_PATH, target_watt);
        let url = self.url(OPTIMAL_PATH);
        let target = target_watt.to_string();
        let response = self
            .retry_request(|| self.client.get(&url).query(&[("target_w", target.as_str())]))
            .await?;
        let body: OptimalBody = Self::json(OPTIMAL_PATH, response).await?;
        body.into_channels()
    }

    async fn json<T: DeserializeOwned>(path: &str, response: Response) -> RemoteResult<T> {
        let response = Self::check_status(path, response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| RemoteError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn ack(path: &str, response: Response) -> RemoteResult<()> {
        Self::check_status(path, response).await?;
        Ok(())
    }

    async fn check_status(path: &str, response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        match status {
            StatusCode::NOT_FOUND => {
                debug!("❌ [REMOTE] {} not found: {}", path, message);
                Err(RemoteError::NotFound(format!("{}: {}", path, message)))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(RemoteError::Timeout),
            status => {
                error!("❌ [REMOTE] {} status {}: {}", path, status, message);
                Err(RemoteError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    fn map_transport(e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::HttpError(e)
        }
    }

    /// Send with exponential backoff on transport failures.
    ///
    /// Only used for reads and idempotent relay commands.
    async fn retry_request<F>(&self, mut build: F) -> RemoteResult<Response>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    debug!("Request failed after {} attempts: {}", attempts, e);
                    return Err(Self::map_transport(e));
                }
                Err(e) => {
                    debug!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use sem_types::Channel;
    use serde_json::json;

    fn client(url: String) -> RemoteClient {
        RemoteClient::new(url, Duration::from_secs(2))
            .unwrap()
            .with_retry_config(1, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_latest_telemetry_device_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/telemetry/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": 812,
                    "name": "user1",
                    "soc": 67.0,
                    "solar_w": 245.5,
                    "lux": 18000,
                    "timestamp": "Tue, 11 Nov 2025 09:30:00 GMT"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let sample = client(server.url()).latest_telemetry().await.unwrap();

        assert!((sample.state_of_charge_percent - 67.0).abs() < f64::EPSILON);
        assert!((sample.solar_power_watts - 245.5).abs() < f64::EPSILON);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_telemetry_missing_field_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/telemetry/latest")
            .with_status(200)
            .with_body(json!({"soc": 67.0, "timestamp": "2025-11-11T09:30:00"}).to_string())
            .create_async()
            .await;

        let result = client(server.url()).latest_telemetry().await;
        assert!(matches!(result, Err(RemoteError::Decode(_))));
    }

    #[tokio::test]
    async fn test_not_found_maps_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/telemetry/latest")
            .with_status(404)
            .with_body(json!({"message": "no data"}).to_string())
            .create_async()
            .await;

        let result = client(server.url()).latest_telemetry().await;
        match result {
            Err(RemoteError::NotFound(message)) => assert!(message.contains("no data")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/relay/reset")
            .with_status(500)
            .with_body(json!({"message": "Internal Server Error"}).to_string())
            .create_async()
            .await;

        let result = client(server.url()).reset_relays().await;
        assert!(matches!(
            result,
            Err(RemoteError::ApiError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_relay_status_on_off_words() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/relay/status")
            .with_status(200)
            .with_body(json!({"A": true, "B": "off", "C": "on", "D": false}).to_string())
            .create_async()
            .await;

        let relays = client(server.url()).relay_status().await.unwrap();
        assert_eq!(
            relays.active(),
            ChannelSet::from([Channel::A, Channel::C])
        );
    }

    #[tokio::test]
    async fn test_update_relays_sends_full_state() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/relay/update")
            .match_body(Matcher::Json(
                json!({"A": false, "B": true, "C": false, "D": false}),
            ))
            .with_status(200)
            .with_body(json!({"message": "success"}).to_string())
            .create_async()
            .await;

        let desired = RelayState::with_on(&ChannelSet::from([Channel::B]));
        client(server.url()).update_relays(&desired).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_uses_service_field_names() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/telemetry")
            .match_body(Matcher::Json(json!({
                "stateOfCharge": 50.0,
                "solarPowerWatts": 100.0,
                "illuminanceLux": 2000.0
            })))
            .with_status(201)
            .create_async()
            .await;

        let reading = TelemetryReading {
            state_of_charge_percent: 50.0,
            solar_power_watts: 100.0,
            illuminance_lux: 2000.0,
        };
        client(server.url()).submit_telemetry(&reading).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_optimal_channels_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/channels/optimal")
            .match_query(Matcher::UrlEncoded("target_w".into(), "300".into()))
            .with_status(200)
            .with_body(json!({"channels": ["A", "D"]}).to_string())
            .create_async()
            .await;

        let channels = client(server.url()).optimal_channels(300.0).await.unwrap();
        assert_eq!(channels, ChannelSet::from([Channel::A, Channel::D]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_hourly_skips_bad_rows() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/telemetry/hourly/3")
            .with_status(200)
            .with_body(
                json!([
                    {"soc": 40, "solar_w": 10, "lux": 100, "timestamp": "2025-11-11T08:00:00"},
                    {"soc": 41, "lux": 100, "timestamp": "2025-11-11T09:00:00"},
                    {"soc": 42, "solar_w": 30, "lux": 300, "timestamp": "2025-11-11T10:00:00"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let samples = client(server.url()).hourly_telemetry(3).await.unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_is_http_error() {
        // Nothing listens on port 9 locally
        let result = client("http://127.0.0.1:9".to_owned()).relay_status().await;
        assert!(matches!(
            result,
            Err(RemoteError::HttpError(_) | RemoteError::Timeout)
        ));
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(matches!(
            RemoteClient::new("ws://localhost:5000", Duration::from_secs(1)),
            Err(RemoteError::ConfigError(_))
        ));
    }
}
