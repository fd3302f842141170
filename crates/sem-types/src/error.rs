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

use thiserror::Error;

/// Failure to turn a wire payload into a validated domain value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("invalid relay value for channel {channel}: {value}")]
    InvalidRelayValue { channel: String, value: String },

    #[error("unknown push event: {0}")]
    UnknownEvent(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
