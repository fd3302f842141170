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

use sem_types::DecodeError;
use thiserror::Error;

/// Remote service error types
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("remote returned error status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("payload rejected: {0}")]
    Decode(#[from] DecodeError),

    #[error("connection timeout")]
    Timeout,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
