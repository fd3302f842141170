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

//! Trading Engine.
//!
//! A sale is validated first, then (in Real mode) gated on the remote relay
//! acknowledgment, and finally committed to the store as one unit:
//! energy balance, cash balance, per-channel ledger and the history head.

use std::sync::Arc;

use chrono::Utc;
use sem_types::{ChannelSet, TradeQuote, TradeRecord};
use tracing::{error, info, warn};

use crate::error::{EngineResult, ValidationError};
use crate::relay::{RelayController, ResetOutcome};
use crate::store::LocalStateStore;

#[derive(Debug)]
pub struct TradingEngine {
    store: Arc<LocalStateStore>,
    relays: Arc<RelayController>,
}

impl TradingEngine {
    pub fn new(store: Arc<LocalStateStore>, relays: Arc<RelayController>) -> Self {
        Self { store, relays }
    }

    /// Price preview; mutates nothing.
    pub fn quote(&self, channels: &ChannelSet) -> TradeQuote {
        TradeQuote::for_channels(channels)
    }

    /// Sell `channels`.
    ///
    /// Rejections (`EmptySelection`, `InsufficientEnergy`) happen before any
    /// side effect. In Real mode a failed relay command aborts the sale and
    /// downgrades the mode; nothing is committed.
    pub async fn sell(&self, channels: &ChannelSet) -> EngineResult<TradeRecord> {
        let quote = self.validate(channels)?;
        info!(
            "💸 [TRADE] Selling {}: {:.0} W for {}",
            channels, quote.total_watt, quote.total_price
        );

        if let Err(e) = self.relays.activate(channels).await {
            warn!("💸 [TRADE] Sale of {} aborted: {}", channels, e);
            return Err(e);
        }

        match self.store.commit_trade(channels, Utc::now()) {
            Ok(record) => {
                info!(
                    "💸 [TRADE] Committed: energy={:.0} W, cash={}",
                    self.store.energy_balance(),
                    self.store.cash_balance()
                );
                Ok(record)
            }
            Err(e) => {
                // Relays are already on at this point; the ledger is not.
                error!("💸 [TRADE] Commit of {} failed after relay activation: {}", channels, e);
                Err(e)
            }
        }
    }

    /// Sell the staged selection and clear it on success.
    pub async fn sell_selection(&self) -> EngineResult<TradeRecord> {
        let selection = self.relays.selection();
        let record = self.sell(&selection).await?;
        self.relays.clear_selection();
        Ok(record)
    }

    /// Switch every relay off. Balances, ledger and history are untouched.
    pub async fn reset(&self) -> EngineResult<ResetOutcome> {
        self.relays.reset().await
    }

    /// Empty the trade history; returns the number of records removed.
    ///
    /// Callers must have obtained an explicit confirmation first.
    pub fn clear_history(&self) -> EngineResult<usize> {
        let removed = self.store.clear_history()?;
        info!("💸 [TRADE] Cleared {} trade records", removed);
        Ok(removed)
    }

    fn validate(&self, channels: &ChannelSet) -> Result<TradeQuote, ValidationError> {
        if channels.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        let quote = TradeQuote::for_channels(channels);
        let available = self.store.energy_balance();
        if available < quote.total_watt {
            return Err(ValidationError::InsufficientEnergy {
                required: quote.total_watt,
                available,
            });
        }
        let balance = self.store.cash_balance();
        if balance.checked_add(quote.total_price).is_none() {
            return Err(ValidationError::CashOverflow {
                balance,
                credit: quote.total_price,
            });
        }
        Ok(quote)
    }
}
