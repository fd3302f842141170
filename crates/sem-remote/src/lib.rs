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

//! Remote collaborator for the Solar ESS Manager engine.
//!
//! [`RemoteClient`] speaks the REST API, [`WebSocketPush`] the push channel;
//! the adapters plug both into the engine's trait seams.

pub mod adapters;
pub mod client;
pub mod errors;
pub mod push;
mod types;

pub use adapters::RemoteTelemetryApi;
pub use client::RemoteClient;
pub use errors::{RemoteError, RemoteResult};
pub use push::WebSocketPush;
