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

//! Solar ESS Manager engine.
//!
//! Decides whether session state comes from the remote telemetry/actuation
//! service (Real) or from the local persisted store (Virtual), and executes
//! energy sales with one auditable ledger commit in either mode.
//!
//! Build a [`Session`] with a [`TelemetryApi`] and a [`PushSource`], call
//! [`Session::start`], and drive every operation through it.

pub mod advisor;
pub mod config;
pub mod data_source;
pub mod error;
pub mod history;
pub mod live;
pub mod mode;
pub mod prober;
pub mod relay;
pub mod session;
pub mod store;
pub mod trading;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use advisor::{Advice, AdviceSource, LocalAdvisor};
pub use config::{AdvisorConfig, DEFAULT_STATE_PATH, EngineConfig, ProbePolicy};
pub use data_source::{DataSource, DataSourceTiming};
pub use error::{EngineError, EngineResult, PersistenceError, ValidationError};
pub use history::HistoryFilter;
pub use live::LiveUpdateChannel;
pub use mode::ModeCell;
pub use prober::{ConnectionProber, ProbeOutcome};
pub use relay::{RelayController, ResetOutcome};
pub use session::Session;
pub use store::{LocalStateStore, STORE_VERSION, StoreSnapshot};
pub use trading::TradingEngine;
pub use traits::{PushSource, PushSubscription, TelemetryApi};
