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

//! Engine error taxonomy.
//!
//! Connectivity failures are non-fatal and drive the mode downgrade,
//! validation failures are synchronous rejections with no state change, and
//! persistence failures come from the local store file.

use std::path::PathBuf;

use sem_types::DecodeError;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Remote unreachable, timed out or answered with an error
    #[error("remote unavailable: {0}")]
    Connectivity(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl EngineError {
    /// Wrap a seam failure, keeping the whole context chain in the message.
    pub fn connectivity(err: &anyhow::Error) -> Self {
        Self::Connectivity(format!("{err:#}"))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no channels selected")]
    EmptySelection,

    #[error("insufficient energy: {required} W required, {available} W available")]
    InsufficientEnergy { required: f64, available: f64 },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("cash balance {balance} cannot take a credit of {credit}")]
    CashOverflow { balance: i64, credit: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<DecodeError> for ValidationError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::OutOfRange { field, value } => Self::OutOfRange { field, value },
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

impl From<DecodeError> for EngineError {
    fn from(err: DecodeError) -> Self {
        Self::Validation(err.into())
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_out_of_range_maps_to_validation() {
        let err: EngineError = DecodeError::OutOfRange {
            field: "stateOfCharge",
            value: 120.0,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::OutOfRange {
                field: "stateOfCharge",
                ..
            })
        ));
    }

    #[test]
    fn test_connectivity_keeps_context_chain() {
        let source = anyhow::anyhow!("connection refused").context("GET /api/relay/status");
        let err = EngineError::connectivity(&source);
        assert!(err.is_connectivity());
        assert_eq!(
            err.to_string(),
            "remote unavailable: GET /api/relay/status: connection refused"
        );
    }
}
