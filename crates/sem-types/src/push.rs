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

//! Push-channel events.
//!
//! Frames are JSON objects `{ "event": <name>, "data": <payload> }`. The
//! device-side names `new_sun_data` and `relay_status_update` are accepted as
//! aliases.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::relay::RelayDelta;
use crate::telemetry::{TelemetryPayload, TelemetrySample};

pub const TELEMETRY_EVENT: &str = "telemetry-update";
pub const RELAY_STATUS_EVENT: &str = "relay-status-update";

const TELEMETRY_ALIASES: [&str; 2] = [TELEMETRY_EVENT, "new_sun_data"];
const RELAY_STATUS_ALIASES: [&str; 2] = [RELAY_STATUS_EVENT, "relay_status_update"];

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A decoded push event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Telemetry(TelemetrySample),
    RelayStatus(RelayDelta),
}

impl PushEvent {
    /// Decode a text frame.
    pub fn decode_frame(text: &str) -> Result<Self, DecodeError> {
        let frame: Frame = serde_json::from_str(text)?;
        Self::from_parts(&frame.event, frame.data)
    }

    pub fn from_parts(event: &str, data: Value) -> Result<Self, DecodeError> {
        if TELEMETRY_ALIASES.contains(&event) {
            let sample = TelemetryPayload::from_value(data)?.decode()?;
            Ok(Self::Telemetry(sample))
        } else if RELAY_STATUS_ALIASES.contains(&event) {
            let delta: RelayDelta = serde_json::from_value(data)?;
            Ok(Self::RelayStatus(delta))
        } else {
            Err(DecodeError::UnknownEvent(event.to_owned()))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => TELEMETRY_EVENT,
            Self::RelayStatus(_) => RELAY_STATUS_EVENT,
        }
    }
}
