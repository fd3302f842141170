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

//! Domain types shared by the SEM engine, remote client and binary.

mod channel;
mod error;
mod ledger;
mod mode;
mod push;
mod relay;
mod telemetry;

pub use channel::{Channel, ChannelSet};
pub use error::DecodeError;
pub use ledger::{
    DEFAULT_CASH_BALANCE, DEFAULT_ENERGY_BALANCE, EnergyLedger, PRICE_PER_WATT, TradeQuote,
    TradeRecord, WATT_PER_CHANNEL,
};
pub use mode::ConnectionMode;
pub use push::{PushEvent, RELAY_STATUS_EVENT, TELEMETRY_EVENT};
pub use relay::{RelayDelta, RelayState, RelayValue};
pub use telemetry::{TelemetryPayload, TelemetryReading, TelemetrySample, parse_timestamp};
