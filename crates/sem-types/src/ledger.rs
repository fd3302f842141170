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

//! Energy ledger, trade records and pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::channel::{Channel, ChannelSet};

/// Whole watts sold per selected channel; every other per-channel constant derives from it
const WHOLE_WATT_PER_CHANNEL: i64 = 100;

/// Watts sold per selected channel in one trade
pub const WATT_PER_CHANNEL: f64 = WHOLE_WATT_PER_CHANNEL as f64;

/// Currency units paid per watt
pub const PRICE_PER_WATT: i64 = 140;

/// Price of one channel's share, kept integral
const PRICE_PER_CHANNEL: i64 = WHOLE_WATT_PER_CHANNEL * PRICE_PER_WATT;

/// Seeded cash balance
pub const DEFAULT_CASH_BALANCE: i64 = 48_020;

/// Seeded energy balance (W)
pub const DEFAULT_ENERGY_BALANCE: f64 = 10_020.0;

/// Watts credited to each channel through trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnergyLedger(BTreeMap<Channel, f64>);

impl EnergyLedger {
    pub fn get(&self, channel: Channel) -> f64 {
        self.0.get(&channel).copied().unwrap_or(0.0)
    }

    /// Overwrite one entry. Only manual overrides and defaults use this.
    pub fn set(&mut self, channel: Channel, watts: f64) {
        self.0.insert(channel, watts);
    }

    /// Add `watts` to every channel in `channels`.
    pub fn credit(&mut self, channels: &ChannelSet, watts: f64) {
        for channel in channels.iter() {
            *self.0.entry(channel).or_insert(0.0) += watts;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        self.0.iter().map(|(c, w)| (*c, *w))
    }
}

impl Default for EnergyLedger {
    fn default() -> Self {
        Self(BTreeMap::from([
            (Channel::A, 0.6),
            (Channel::B, 1.55),
            (Channel::C, 0.93),
            (Channel::D, 0.61),
        ]))
    }
}

/// Price preview for a channel selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeQuote {
    pub channel_count: usize,
    pub total_watt: f64,
    pub total_price: i64,
}

impl TradeQuote {
    pub fn for_channels(channels: &ChannelSet) -> Self {
        let count = channels.len();
        let total_watt = count as f64 * WATT_PER_CHANNEL;
        let total_price = i64::try_from(count).unwrap_or(i64::MAX) * PRICE_PER_CHANNEL;
        Self {
            channel_count: count,
            total_watt,
            total_price,
        }
    }
}

/// One completed sale. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub channels: Vec<Channel>,
    pub total_watt: f64,
    pub total_price: i64,
}

impl TradeRecord {
    pub fn new(timestamp: DateTime<Utc>, channels: &ChannelSet, quote: TradeQuote) -> Self {
        Self {
            timestamp,
            channels: channels.to_vec(),
            total_watt: quote.total_watt,
            total_price: quote.total_price,
        }
    }

    pub fn involves(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_two_channels() {
        let quote = TradeQuote::for_channels(&ChannelSet::from([Channel::A, Channel::B]));
        assert_eq!(quote.channel_count, 2);
        assert!((quote.total_watt - 200.0).abs() < f64::EPSILON);
        assert_eq!(quote.total_price, 28_000);
    }

    #[test]
    fn test_channel_price_matches_channel_watts() {
        let quote = TradeQuote::for_channels(&ChannelSet::from([Channel::D]));
        assert!((quote.total_watt - WATT_PER_CHANNEL).abs() < f64::EPSILON);
        assert_eq!(quote.total_price as f64, WATT_PER_CHANNEL * PRICE_PER_WATT as f64);
    }

    #[test]
    fn test_quote_empty_is_zero() {
        let quote = TradeQuote::for_channels(&ChannelSet::new());
        assert_eq!(quote.total_price, 0);
    }

    #[test]
    fn test_credit_only_touches_selected() {
        let mut ledger = EnergyLedger::default();
        ledger.credit(&ChannelSet::from([Channel::B]), WATT_PER_CHANNEL);

        assert!((ledger.get(Channel::B) - 101.55).abs() < 1e-9);
        assert!((ledger.get(Channel::A) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_ledger_serializes_as_map() {
        let json = serde_json::to_value(EnergyLedger::default()).unwrap();
        assert_eq!(json["B"], 1.55);
    }
}
