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

//! Websocket push source.
//!
//! Frames are JSON `{ "event": <name>, "data": <payload> }`. Malformed frames
//! are logged and skipped; a close frame, socket error or end of stream ends the
//! subscription so the engine falls back to Virtual.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sem_core::PushSubscription;
use sem_types::PushEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::errors::{RemoteError, RemoteResult};

const DEFAULT_CAPACITY: usize = 64;

/// Connects to the push endpoint and streams decoded events
#[derive(Debug, Clone)]
pub struct WebSocketPush {
    url: String,
    connect_timeout: Duration,
    capacity: usize,
}

impl WebSocketPush {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> RemoteResult<Self> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(RemoteError::ConfigError(format!(
                "push URL must start with ws:// or wss://, got '{}'",
                url
            )));
        }
        Ok(Self {
            url,
            connect_timeout,
            capacity: DEFAULT_CAPACITY,
        })
    }

    /// Derive the push URL from the REST base (`http://host` -> `ws://host/ws`).
    pub fn from_base_url(base_url: &str, connect_timeout: Duration) -> RemoteResult<Self> {
        let base = base_url.trim_end_matches('/');
        let url = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}/ws")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}/ws")
        } else {
            return Err(RemoteError::ConfigError(format!(
                "cannot derive push URL from '{}'",
                base_url
            )));
        };
        Self::new(url, connect_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the socket and spawn the reader task.
    pub async fn connect(&self) -> RemoteResult<PushSubscription> {
        info!("🔌 [PUSH] Connecting to {}", self.url);

        let (ws_stream, _) =
            match tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await
            {
                Ok(Ok((stream, response))) => (stream, response),
                Ok(Err(e)) => return Err(RemoteError::WebSocket(e.to_string())),
                Err(_) => return Err(RemoteError::Timeout),
            };

        info!("✅ [PUSH] Connected");

        let (tx, rx) = mpsc::channel(self.capacity);
        let (mut write, mut read) = ws_stream.split();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tx.closed() => {
                        debug!("[PUSH] Subscriber dropped, closing socket");
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            match PushEvent::decode_frame(text.as_str()) {
                                Ok(event) => {
                                    debug!("📨 [PUSH] {}", event.name());
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("⚠️ [PUSH] Skipping malformed frame: {}", e),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!("⚠️ [PUSH] Pong failed: {}", e);
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!("🔌 [PUSH] Close frame: {:?}", frame);
                            return;
                        }
                        Some(Err(e)) => {
                            warn!("🔌 [PUSH] Socket error: {}", e);
                            return;
                        }
                        None => {
                            warn!("🔌 [PUSH] Stream ended");
                            return;
                        }
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Ok(PushSubscription::new(rx).with_task(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sem_types::Channel;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// One-shot server that sends `frames` and then closes.
    async fn serve(frames: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(Message::Text(frame.into())).await.unwrap();
            }
            ws.close(None).await.ok();
        });
        format!("ws://{addr}/ws")
    }

    #[test]
    fn test_push_url_from_base() {
        let push = WebSocketPush::from_base_url("https://sem.local:5000/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(push.url(), "wss://sem.local:5000/ws");
        assert!(WebSocketPush::from_base_url("ftp://x", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_frames_decoded_and_malformed_skipped() {
        let url = serve(vec![
            r#"{"event":"relay-status-update","data":{"A":"on"}}"#,
            "not json",
            r#"{"event":"mystery","data":{}}"#,
            concat!(
                r#"{"event":"new_sun_data","data":"#,
                r#"{"soc":80,"solar_w":500,"lux":40000,"timestamp":"2025-11-11T12:00:00Z"}}"#
            ),
        ])
        .await;

        let push = WebSocketPush::new(url, Duration::from_secs(2)).unwrap();
        let mut subscription = push.connect().await.unwrap();

        let Some(PushEvent::RelayStatus(delta)) = subscription.recv().await else {
            panic!("expected relay event");
        };
        assert_eq!(delta.iter().collect::<Vec<_>>(), vec![(Channel::A, true)]);

        let Some(PushEvent::Telemetry(sample)) = subscription.recv().await else {
            panic!("expected telemetry event");
        };
        assert!((sample.state_of_charge_percent - 80.0).abs() < f64::EPSILON);

        // Server closed: stream ends
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let push = WebSocketPush::new(format!("ws://{addr}/ws"), Duration::from_secs(1)).unwrap();
        assert!(push.connect().await.is_err());
    }
}
