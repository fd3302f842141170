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

//! Wire shapes that only exist at the HTTP boundary.

use serde::Deserialize;
use serde_json::Value;

use sem_types::{ChannelSet, TelemetryPayload};

use crate::errors::{RemoteError, RemoteResult};

/// `{"message": "..."}` error/ack body
#[derive(Debug, Deserialize)]
pub(crate) struct MessageBody {
    pub message: String,
}

/// Hourly telemetry comes either as a bare array or wrapped in `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum HourlyBody {
    List(Vec<TelemetryPayload>),
    Wrapped { data: Vec<TelemetryPayload> },
}

impl HourlyBody {
    pub fn into_rows(self) -> Vec<TelemetryPayload> {
        match self {
            Self::List(rows) | Self::Wrapped { data: rows } => rows,
        }
    }
}

/// `{"channels": ["A", "C"]}`
#[derive(Debug, Deserialize)]
pub(crate) struct OptimalBody {
    pub channels: Vec<String>,
}

impl OptimalBody {
    pub fn into_channels(self) -> RemoteResult<ChannelSet> {
        self.channels
            .iter()
            .map(|c| c.parse().map_err(RemoteError::from))
            .collect()
    }
}

/// Pull a human message out of an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<MessageBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => match serde_json::from_str::<Value>(body) {
            Ok(Value::String(s)) => s,
            _ => body.trim().to_owned(),
        },
    }
}
