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

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

/// One of the four addressable consumption endpoints.
///
/// Each channel has its own relay and its own ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
    C,
    D,
}

impl Channel {
    /// All channels in wire order
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(DecodeError::UnknownChannel(s.to_owned())),
        }
    }
}

/// An ordered, duplicate-free set of channels.
///
/// Used both for the staged trade selection and for advisor recommendations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSet(BTreeSet<Channel>);

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Channel::ALL.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0.contains(&channel)
    }

    /// Insert a channel, returning `false` if it was already present.
    pub fn insert(&mut self, channel: Channel) -> bool {
        self.0.insert(channel)
    }

    /// Flip membership of `channel`, returning whether it is now selected.
    pub fn toggle(&mut self, channel: Channel) -> bool {
        if self.0.remove(&channel) {
            false
        } else {
            self.0.insert(channel);
            true
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<Channel> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Channel; N]> for ChannelSet {
    fn from(channels: [Channel; N]) -> Self {
        channels.into_iter().collect()
    }
}

impl IntoIterator for ChannelSet {
    type Item = Channel;
    type IntoIter = std::collections::btree_set::IntoIter<Channel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl FromStr for ChannelSet {
    type Err = DecodeError;

    /// Parses "A,B", "a b" or "AB" style selections.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(|c| c.to_string().parse::<Channel>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_is_case_insensitive() {
        assert_eq!("a".parse::<Channel>().unwrap(), Channel::A);
        assert_eq!(" D ".parse::<Channel>().unwrap(), Channel::D);
        assert!(matches!(
            "E".parse::<Channel>(),
            Err(DecodeError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_channel_set_toggle() {
        let mut set = ChannelSet::new();
        assert!(set.toggle(Channel::B));
        assert!(set.contains(Channel::B));
        assert!(!set.toggle(Channel::B));
        assert!(set.is_empty());
    }

    #[test]
    fn test_channel_set_parse_and_display() {
        let set: ChannelSet = "b, a,b".parse().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "[A, B]");

        let compact: ChannelSet = "CD".parse().unwrap();
        assert_eq!(compact, ChannelSet::from([Channel::C, Channel::D]));
    }

    #[test]
    fn test_channel_set_serializes_as_list() {
        let set = ChannelSet::from([Channel::C, Channel::A]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["A","C"]"#);
    }
}
