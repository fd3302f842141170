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

//! Relay on/off state per channel.
//!
//! The device side reports relays either as JSON booleans or as the strings
//! `"on"` / `"off"`; both decode into the same typed state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::channel::{Channel, ChannelSet};
use crate::error::DecodeError;

/// Raw relay value as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayValue {
    Flag(bool),
    Word(String),
}

impl RelayValue {
    fn decode(&self, channel: &str) -> Result<bool, DecodeError> {
        match self {
            Self::Flag(on) => Ok(*on),
            Self::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "on" | "true" => Ok(true),
                "off" | "false" => Ok(false),
                _ => Err(DecodeError::InvalidRelayValue {
                    channel: channel.to_owned(),
                    value: word.clone(),
                }),
            },
        }
    }
}

fn decode_entries(
    raw: BTreeMap<String, RelayValue>,
) -> Result<BTreeMap<Channel, bool>, DecodeError> {
    raw.iter()
        .map(|(key, value)| {
            let channel = key.parse::<Channel>()?;
            Ok((channel, value.decode(key)?))
        })
        .collect()
}

/// Full relay state: every channel has a known position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, RelayValue>",
    into = "BTreeMap<Channel, bool>"
)]
pub struct RelayState {
    channels: BTreeMap<Channel, bool>,
}

impl RelayState {
    /// Every relay open
    pub fn all_off() -> Self {
        Self {
            channels: Channel::ALL.into_iter().map(|c| (c, false)).collect(),
        }
    }

    /// Relays closed exactly for the given channels.
    pub fn with_on(channels: &ChannelSet) -> Self {
        let mut state = Self::all_off();
        for channel in channels.iter() {
            state.set(channel, true);
        }
        state
    }

    pub fn is_on(&self, channel: Channel) -> bool {
        self.channels.get(&channel).copied().unwrap_or(false)
    }

    pub fn set(&mut self, channel: Channel, on: bool) {
        self.channels.insert(channel, on);
    }

    /// Channels whose relay is currently closed.
    pub fn active(&self) -> ChannelSet {
        self.channels
            .iter()
            .filter_map(|(channel, on)| on.then_some(*channel))
            .collect()
    }

    pub fn all_open(&self) -> bool {
        self.channels.values().all(|on| !on)
    }

    /// Apply a partial update, last write wins per channel.
    pub fn merge(&mut self, delta: &RelayDelta) {
        for (channel, on) in delta.iter() {
            self.set(channel, on);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, bool)> + '_ {
        self.channels.iter().map(|(c, on)| (*c, *on))
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::all_off()
    }
}

impl TryFrom<BTreeMap<String, RelayValue>> for RelayState {
    type Error = DecodeError;

    fn try_from(raw: BTreeMap<String, RelayValue>) -> Result<Self, Self::Error> {
        let channels = decode_entries(raw)?;
        if let Some(missing) = Channel::ALL.iter().find(|c| !channels.contains_key(c)) {
            return Err(DecodeError::MissingField(missing.as_str()));
        }
        Ok(Self { channels })
    }
}

impl From<RelayState> for BTreeMap<Channel, bool> {
    fn from(state: RelayState) -> Self {
        state.channels
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .channels
            .iter()
            .map(|(c, on)| format!("{c}={}", if *on { "on" } else { "off" }))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Partial relay update carried by a push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, RelayValue>",
    into = "BTreeMap<Channel, bool>"
)]
pub struct RelayDelta {
    channels: BTreeMap<Channel, bool>,
}

impl RelayDelta {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, bool)> + '_ {
        self.channels.iter().map(|(c, on)| (*c, *on))
    }
}

impl FromIterator<(Channel, bool)> for RelayDelta {
    fn from_iter<I: IntoIterator<Item = (Channel, bool)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().collect(),
        }
    }
}

impl From<RelayState> for RelayDelta {
    fn from(state: RelayState) -> Self {
        Self {
            channels: state.channels,
        }
    }
}

impl TryFrom<BTreeMap<String, RelayValue>> for RelayDelta {
    type Error = DecodeError;

    fn try_from(raw: BTreeMap<String, RelayValue>) -> Result<Self, Self::Error> {
        Ok(Self {
            channels: decode_entries(raw)?,
        })
    }
}

impl From<RelayDelta> for BTreeMap<Channel, bool> {
    fn from(delta: RelayDelta) -> Self {
        delta.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_boolean_status() {
        let state: RelayState =
            serde_json::from_str(r#"{"A": true, "B": false, "C": false, "D": true}"#).unwrap();
        assert!(state.is_on(Channel::A));
        assert!(!state.is_on(Channel::B));
        assert_eq!(state.active(), ChannelSet::from([Channel::A, Channel::D]));
    }

    #[test]
    fn test_decode_on_off_words() {
        let state: RelayState =
            serde_json::from_str(r#"{"A": "on", "B": "off", "C": "OFF", "D": "On"}"#).unwrap();
        assert_eq!(state.active(), ChannelSet::from([Channel::A, Channel::D]));
    }

    #[test]
    fn test_full_state_requires_every_channel() {
        let result = serde_json::from_str::<RelayState>(r#"{"A": true, "B": false}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_value_rejected() {
        let result = serde_json::from_str::<RelayState>(
            r#"{"A": "maybe", "B": false, "C": false, "D": false}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_delta_merge_is_per_channel() {
        let mut state = RelayState::with_on(&ChannelSet::from([Channel::A, Channel::B]));
        let delta: RelayDelta = serde_json::from_str(r#"{"B": "off", "C": true}"#).unwrap();
        state.merge(&delta);

        assert!(state.is_on(Channel::A));
        assert!(!state.is_on(Channel::B));
        assert!(state.is_on(Channel::C));
        assert!(!state.is_on(Channel::D));
    }

    #[test]
    fn test_serialized_form_uses_booleans() {
        let state = RelayState::with_on(&ChannelSet::from([Channel::C]));
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            r#"{"A":false,"B":false,"C":true,"D":false}"#
        );
    }
}
