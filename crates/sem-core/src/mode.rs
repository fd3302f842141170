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

use std::sync::Arc;

use sem_types::ConnectionMode;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared connection-mode flag.
///
/// Cloning shares the same flag. Every transition is logged once; setting the
/// current value again is a no-op.
#[derive(Debug, Clone)]
pub struct ModeCell {
    tx: Arc<watch::Sender<ConnectionMode>>,
}

impl ModeCell {
    /// Starts in [`ConnectionMode::Probing`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionMode::Probing);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ConnectionMode {
        *self.tx.borrow()
    }

    /// Move to `mode`, returning whether anything changed.
    pub fn set(&self, mode: ConnectionMode) -> bool {
        let mut previous = mode;
        let changed = self.tx.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            previous = *current;
            *current = mode;
            true
        });
        if changed {
            info!("🔌 [MODE] {} → {}", previous, mode);
        }
        changed
    }

    /// Fall back to Virtual after a remote failure.
    pub fn downgrade(&self, reason: &str) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == ConnectionMode::Virtual {
                return false;
            }
            *current = ConnectionMode::Virtual;
            true
        });
        if changed {
            warn!("🔌 [MODE] Downgraded to virtual: {}", reason);
        }
        changed
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionMode> {
        self.tx.subscribe()
    }
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new()
    }
}
