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

//! Telemetry samples and the explicit wire decode step.
//!
//! Wire payloads are decoded into [`TelemetryPayload`] first (every field
//! optional) and only then validated into a [`TelemetrySample`]. A missing or
//! out-of-range field is a [`DecodeError`]; nothing is silently defaulted.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Latest reading from the installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Battery state of charge (0-100%)
    pub state_of_charge_percent: f64,
    /// Instantaneous PV generation (W)
    pub solar_power_watts: f64,
    /// Panel illuminance (lux)
    pub illuminance_lux: f64,
    /// When the device took the reading
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    /// Build a validated sample.
    pub fn new(
        state_of_charge_percent: f64,
        solar_power_watts: f64,
        illuminance_lux: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        let reading = TelemetryReading {
            state_of_charge_percent,
            solar_power_watts,
            illuminance_lux,
        };
        reading.validate()?;
        Ok(reading.at(timestamp))
    }

    /// Age of the sample relative to `now` (negative if the device clock runs ahead).
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }

    pub fn reading(&self) -> TelemetryReading {
        TelemetryReading {
            state_of_charge_percent: self.state_of_charge_percent,
            solar_power_watts: self.solar_power_watts,
            illuminance_lux: self.illuminance_lux,
        }
    }
}

/// A reading without a timestamp, as submitted upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    #[serde(rename = "stateOfCharge")]
    pub state_of_charge_percent: f64,
    #[serde(rename = "solarPowerWatts")]
    pub solar_power_watts: f64,
    #[serde(rename = "illuminanceLux")]
    pub illuminance_lux: f64,
}

impl TelemetryReading {
    pub fn validate(&self) -> Result<(), DecodeError> {
        let soc = self.state_of_charge_percent;
        if !soc.is_finite() || !(0.0..=100.0).contains(&soc) {
            return Err(DecodeError::OutOfRange {
                field: "stateOfCharge",
                value: soc,
            });
        }
        non_negative("solarPowerWatts", self.solar_power_watts)?;
        non_negative("illuminanceLux", self.illuminance_lux)?;
        Ok(())
    }

    /// Stamp the reading. Call [`Self::validate`] first.
    pub fn at(self, timestamp: DateTime<Utc>) -> TelemetrySample {
        TelemetrySample {
            state_of_charge_percent: self.state_of_charge_percent,
            solar_power_watts: self.solar_power_watts,
            illuminance_lux: self.illuminance_lux,
            timestamp,
        }
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), DecodeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DecodeError::OutOfRange { field, value })
    }
}

/// Undecoded telemetry as delivered by REST or push.
///
/// Accepts both the service field names and the device field names
/// (`soc`, `solar_w`, `lux`). Unknown fields such as row ids are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryPayload {
    #[serde(default, rename = "stateOfCharge", alias = "soc")]
    pub state_of_charge: Option<f64>,
    #[serde(default, rename = "solarPowerWatts", alias = "solar_w")]
    pub solar_power_watts: Option<f64>,
    #[serde(default, rename = "illuminanceLux", alias = "lux")]
    pub illuminance_lux: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl TelemetryPayload {
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Validate into a typed sample.
    pub fn decode(self) -> Result<TelemetrySample, DecodeError> {
        let soc = self
            .state_of_charge
            .ok_or(DecodeError::MissingField("stateOfCharge"))?;
        let solar = self
            .solar_power_watts
            .ok_or(DecodeError::MissingField("solarPowerWatts"))?;
        let lux = self
            .illuminance_lux
            .ok_or(DecodeError::MissingField("illuminanceLux"))?;
        let timestamp = match self.timestamp {
            Some(raw) => decode_timestamp(&raw)?,
            None => return Err(DecodeError::MissingField("timestamp")),
        };
        TelemetrySample::new(soc, solar, lux, timestamp)
    }
}

impl TryFrom<TelemetryPayload> for TelemetrySample {
    type Error = DecodeError;

    fn try_from(payload: TelemetryPayload) -> Result<Self, Self::Error> {
        payload.decode()
    }
}

fn decode_timestamp(raw: &Value) -> Result<DateTime<Utc>, DecodeError> {
    match raw {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => {
            let secs = number
                .as_f64()
                .ok_or_else(|| DecodeError::InvalidTimestamp(number.to_string()))?;
            // Device firmware sends milliseconds, the service sends seconds.
            #[expect(clippy::cast_possible_truncation)]
            let millis = if secs > 1e12 { secs } else { secs * 1000.0 } as i64;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| DecodeError::InvalidTimestamp(number.to_string()))
        }
        other => Err(DecodeError::InvalidTimestamp(other.to_string())),
    }
}

/// Parse RFC 3339, RFC 2822 (HTTP-date) or naive ISO-8601 timestamps.
///
/// Naive timestamps carry no offset and are taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(DecodeError::InvalidTimestamp(text.to_owned()))
}
