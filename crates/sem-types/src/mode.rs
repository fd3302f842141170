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
use std::fmt;

/// Where session state is currently sourced from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Startup, before the first probe has resolved
    #[default]
    Probing,
    /// Remote service reachable; local store mirrors it
    Real,
    /// Offline fallback; local store is authoritative
    Virtual,
}

impl ConnectionMode {
    pub fn is_real(self) -> bool {
        matches!(self, Self::Real)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Probing => "probing",
            Self::Real => "real",
            Self::Virtual => "virtual",
        };
        f.write_str(s)
    }
}
