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

//! Local State Store.
//!
//! One JSON file holds every persisted record inside a versioned envelope:
//!
//! ```json
//! { "version": 1, "records": { "telemetry": ..., "relay_state": ..., ... } }
//! ```
//!
//! Records are decoded independently. A missing or malformed record is
//! replaced by its seeded default and the file is rewritten, so one bad
//! record never discards the others. Every mutation is applied to a copy,
//! written atomically (temp file + rename) and only then made visible.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use sem_types::{
    Channel, ChannelSet, DEFAULT_CASH_BALANCE, DEFAULT_ENERGY_BALANCE, EnergyLedger, RelayDelta,
    RelayState, TelemetrySample, TradeQuote, TradeRecord, WATT_PER_CHANNEL,
};

use crate::error::{EngineResult, PersistenceError, ValidationError};

/// Envelope format written by this build
pub const STORE_VERSION: u32 = 1;

/// Every persisted record, as one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub telemetry: Option<TelemetrySample>,
    pub relay_state: RelayState,
    pub cash_balance: i64,
    pub energy_ledger: EnergyLedger,
    /// Most recent first
    pub trade_history: Vec<TradeRecord>,
    pub energy_balance: f64,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            telemetry: None,
            relay_state: RelayState::all_off(),
            cash_balance: DEFAULT_CASH_BALANCE,
            energy_ledger: EnergyLedger::default(),
            trade_history: Vec::new(),
            energy_balance: DEFAULT_ENERGY_BALANCE,
        }
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    records: &'a StoreSnapshot,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    #[serde(default)]
    records: Map<String, Value>,
}

/// Persisted key/value record set
#[derive(Debug)]
pub struct LocalStateStore {
    path: Option<PathBuf>,
    state: Mutex<StoreSnapshot>,
}

impl LocalStateStore {
    /// Open the store at `path`, seeding defaults for anything absent.
    ///
    /// An unreadable envelope or a newer format version is moved aside with a
    /// `.bak` extension and the store starts from defaults.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let (snapshot, dirty) = load_file(&path)?;
        let store = Self {
            path: Some(path),
            state: Mutex::new(snapshot),
        };
        if dirty {
            let state = store.state.lock();
            store.persist(&state)?;
        }
        store.log_summary("Opened");
        Ok(store)
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreSnapshot::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the file, replacing the in-memory state.
    pub fn reload(&self) -> EngineResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let (snapshot, dirty) = load_file(path)?;
        if dirty {
            self.persist(&snapshot)?;
        }
        *self.state.lock() = snapshot;
        self.log_summary("Reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().clone()
    }

    pub fn telemetry(&self) -> Option<TelemetrySample> {
        self.state.lock().telemetry.clone()
    }

    pub fn relay_state(&self) -> RelayState {
        self.state.lock().relay_state.clone()
    }

    pub fn cash_balance(&self) -> i64 {
        self.state.lock().cash_balance
    }

    pub fn energy_balance(&self) -> f64 {
        self.state.lock().energy_balance
    }

    pub fn energy_ledger(&self) -> EnergyLedger {
        self.state.lock().energy_ledger.clone()
    }

    pub fn trade_history(&self) -> Vec<TradeRecord> {
        self.state.lock().trade_history.clone()
    }

    /// Overwrite the telemetry snapshot wholesale.
    pub fn set_telemetry(&self, sample: TelemetrySample) -> EngineResult<()> {
        self.update(|s| {
            s.telemetry = Some(sample);
            Ok(())
        })
    }

    pub fn set_relay_state(&self, relays: RelayState) -> EngineResult<()> {
        self.update(|s| {
            s.relay_state = relays;
            Ok(())
        })
    }

    /// Merge a partial relay update, last write wins per channel.
    pub fn merge_relay_delta(&self, delta: &RelayDelta) -> EngineResult<RelayState> {
        self.update(|s| {
            s.relay_state.merge(delta);
            Ok(s.relay_state.clone())
        })
    }

    /// Apply the commit effect of a sale as one unit.
    ///
    /// Energy and cash headroom are re-checked against the current balances;
    /// on rejection nothing changes.
    pub fn commit_trade(
        &self,
        channels: &ChannelSet,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<TradeRecord> {
        let quote = TradeQuote::for_channels(channels);
        self.update(|s| {
            if channels.is_empty() {
                return Err(ValidationError::EmptySelection.into());
            }
            if s.energy_balance < quote.total_watt {
                return Err(ValidationError::InsufficientEnergy {
                    required: quote.total_watt,
                    available: s.energy_balance,
                }
                .into());
            }
            let cash = s.cash_balance.checked_add(quote.total_price).ok_or(
                ValidationError::CashOverflow {
                    balance: s.cash_balance,
                    credit: quote.total_price,
                },
            )?;
            s.energy_balance -= quote.total_watt;
            s.cash_balance = cash;
            s.energy_ledger.credit(channels, WATT_PER_CHANNEL);
            let record = TradeRecord::new(timestamp, channels, quote);
            s.trade_history.insert(0, record.clone());
            Ok(record)
        })
    }

    /// Empty the trade history, returning how many records were removed.
    pub fn clear_history(&self) -> EngineResult<usize> {
        self.update(|s| {
            let removed = s.trade_history.len();
            s.trade_history.clear();
            Ok(removed)
        })
    }

    pub fn set_energy_balance(&self, watts: f64) -> EngineResult<()> {
        check_non_negative("energy_balance", watts)?;
        self.update(|s| {
            s.energy_balance = watts;
            Ok(())
        })
    }

    pub fn set_cash_balance(&self, amount: i64) -> EngineResult<()> {
        if amount < 0 {
            return Err(ValidationError::OutOfRange {
                field: "cash_balance",
                value: amount as f64,
            }
            .into());
        }
        self.update(|s| {
            s.cash_balance = amount;
            Ok(())
        })
    }

    pub fn set_ledger_entry(&self, channel: Channel, watts: f64) -> EngineResult<()> {
        check_non_negative("energy_ledger", watts)?;
        self.update(|s| {
            s.energy_ledger.set(channel, watts);
            Ok(())
        })
    }

    /// Re-seed every record with its default.
    pub fn restore_defaults(&self) -> EngineResult<()> {
        self.update(|s| {
            *s = StoreSnapshot::default();
            Ok(())
        })?;
        info!("💾 [STORE] Restored default records");
        Ok(())
    }

    fn update<R>(&self, f: impl FnOnce(&mut StoreSnapshot) -> EngineResult<R>) -> EngineResult<R> {
        let mut guard = self.state.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> EngineResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&EnvelopeOut {
            version: STORE_VERSION,
            records: snapshot,
        })
        .map_err(PersistenceError::from)?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(|e| PersistenceError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| PersistenceError::io(path, e))?;

        debug!("💾 [STORE] Saved state to {}", path.display());
        Ok(())
    }

    fn log_summary(&self, verb: &str) {
        let s = self.state.lock();
        info!(
            "💾 [STORE] {} state: energy={:.2} W, cash={}, trades={}, relays [{}]",
            verb,
            s.energy_balance,
            s.cash_balance,
            s.trade_history.len(),
            s.relay_state
        );
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

/// Read the store file. The flag is set when the file must be rewritten.
fn load_file(path: &Path) -> EngineResult<(StoreSnapshot, bool)> {
    if !path.exists() {
        info!(
            "💾 [STORE] No state file at {}, seeding defaults",
            path.display()
        );
        return Ok((StoreSnapshot::default(), true));
    }

    let contents = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;

    let envelope = match parse_envelope(&contents) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                "💾 [STORE] Cannot use {} ({}), moving it aside and seeding defaults",
                path.display(),
                e
            );
            let backup = path.with_extension("bak");
            fs::rename(path, &backup).map_err(|e| PersistenceError::io(&backup, e))?;
            return Ok((StoreSnapshot::default(), true));
        }
    };

    Ok(decode_records(envelope.records))
}

fn parse_envelope(contents: &str) -> Result<EnvelopeIn, PersistenceError> {
    let envelope: EnvelopeIn = serde_json::from_str(contents)?;
    if envelope.version > STORE_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: envelope.version,
            supported: STORE_VERSION,
        });
    }
    Ok(envelope)
}

fn decode_records(mut records: Map<String, Value>) -> (StoreSnapshot, bool) {
    let defaults = StoreSnapshot::default();
    let mut dirty = false;

    let telemetry = record(&mut records, "telemetry", defaults.telemetry, &mut dirty);
    let relay_state = record(&mut records, "relay_state", defaults.relay_state, &mut dirty);
    let mut cash_balance = record(
        &mut records,
        "cash_balance",
        defaults.cash_balance,
        &mut dirty,
    );
    let energy_ledger = record(
        &mut records,
        "energy_ledger",
        defaults.energy_ledger,
        &mut dirty,
    );
    let trade_history = record(
        &mut records,
        "trade_history",
        defaults.trade_history,
        &mut dirty,
    );
    let mut energy_balance = record(
        &mut records,
        "energy_balance",
        defaults.energy_balance,
        &mut dirty,
    );

    if cash_balance < 0 {
        warn!("💾 [STORE] Negative cash balance {cash_balance}, seeding default");
        cash_balance = DEFAULT_CASH_BALANCE;
        dirty = true;
    }
    if !energy_balance.is_finite() || energy_balance < 0.0 {
        warn!("💾 [STORE] Invalid energy balance {energy_balance}, seeding default");
        energy_balance = DEFAULT_ENERGY_BALANCE;
        dirty = true;
    }

    let snapshot = StoreSnapshot {
        telemetry,
        relay_state,
        cash_balance,
        energy_ledger,
        trade_history,
        energy_balance,
    };
    (snapshot, dirty)
}

fn record<T: DeserializeOwned>(
    records: &mut Map<String, Value>,
    key: &'static str,
    default: T,
    dirty: &mut bool,
) -> T {
    let Some(value) = records.remove(key) else {
        debug!("💾 [STORE] Record '{key}' absent, seeding default");
        *dirty = true;
        return default;
    };
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("💾 [STORE] Record '{key}' is malformed ({e}), seeding default");
            *dirty = true;
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sem_types::PRICE_PER_WATT;
    use tempfile::tempdir;

    fn ab() -> ChannelSet {
        ChannelSet::from([Channel::A, Channel::B])
    }

    #[test]
    fn test_missing_file_seeds_defaults_and_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("state.json");

        let store = LocalStateStore::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(store.snapshot(), StoreSnapshot::default());
        assert_eq!(store.cash_balance(), 48_020);
        assert!((store.energy_ledger().get(Channel::B) - 1.55).abs() < 1e-9);
        assert!(store.relay_state().all_open());
    }

    #[test]
    fn test_commit_trade_applies_all_effects() {
        let store = LocalStateStore::in_memory();
        store.set_energy_balance(1000.0).unwrap();
        let cash_before = store.cash_balance();
        let ledger_before = store.energy_ledger();

        let record = store.commit_trade(&ab(), Utc::now()).unwrap();

        assert!((store.energy_balance() - 800.0).abs() < f64::EPSILON);
        assert_eq!(store.cash_balance(), cash_before + 28_000);
        for channel in [Channel::A, Channel::B] {
            let expected = ledger_before.get(channel) + WATT_PER_CHANNEL;
            assert!((store.energy_ledger().get(channel) - expected).abs() < 1e-9);
        }
        assert_eq!(record.channels, vec![Channel::A, Channel::B]);
        assert_eq!(record.total_price, 200 * PRICE_PER_WATT);
        assert_eq!(store.trade_history(), vec![record]);
    }

    #[test]
    fn test_commit_trade_insufficient_energy_changes_nothing() {
        let store = LocalStateStore::in_memory();
        store.set_energy_balance(150.0).unwrap();
        let before = store.snapshot();

        let result = store.commit_trade(&ab(), Utc::now());

        assert!(matches!(
            result,
            Err(crate::EngineError::Validation(
                ValidationError::InsufficientEnergy { .. }
            ))
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_commit_trade_cash_overflow_changes_nothing() {
        let store = LocalStateStore::in_memory();
        store.set_cash_balance(i64::MAX).unwrap();
        let before = store.snapshot();

        let result = store.commit_trade(&ChannelSet::from([Channel::A]), Utc::now());

        assert!(matches!(
            result,
            Err(crate::EngineError::Validation(ValidationError::CashOverflow {
                balance: i64::MAX,
                credit: 14_000,
            }))
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_history_is_most_recent_first() {
        let store = LocalStateStore::in_memory();
        let first = store
            .commit_trade(&ChannelSet::from([Channel::A]), Utc::now())
            .unwrap();
        let second = store
            .commit_trade(&ChannelSet::from([Channel::C]), Utc::now())
            .unwrap();

        assert_eq!(store.trade_history(), vec![second, first]);
        assert_eq!(store.clear_history().unwrap(), 2);
        assert!(store.trade_history().is_empty());
    }

    #[test]
    fn test_reload_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = LocalStateStore::open(&path).unwrap();
        store.commit_trade(&ab(), Utc::now()).unwrap();
        store
            .set_relay_state(RelayState::with_on(&ChannelSet::from([Channel::D])))
            .unwrap();
        let written = store.snapshot();

        let reopened = LocalStateStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot(), written);

        reopened.reload().unwrap();
        assert_eq!(reopened.snapshot(), written);
    }

    #[test]
    fn test_malformed_record_falls_back_individually() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"version":1,"records":{"cash_balance":"lots","energy_balance":555.0,
                "relay_state":{"A":true,"B":false,"C":false,"D":false}}}"#,
        )
        .unwrap();

        let store = LocalStateStore::open(&path).unwrap();

        assert_eq!(store.cash_balance(), DEFAULT_CASH_BALANCE);
        assert!((store.energy_balance() - 555.0).abs() < f64::EPSILON);
        assert!(store.relay_state().is_on(Channel::A));

        // Repaired file decodes cleanly
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"cash_balance\": 48020"));
    }

    #[test]
    fn test_newer_version_is_moved_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"version":7,"records":{"cash_balance":1}}"#).unwrap();

        let store = LocalStateStore::open(&path).unwrap();

        assert_eq!(store.snapshot(), StoreSnapshot::default());
        assert!(path.with_extension("bak").exists());
    }

    #[test]
    fn test_garbage_file_is_moved_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let store = LocalStateStore::open(&path).unwrap();
        assert_eq!(store.cash_balance(), DEFAULT_CASH_BALANCE);
        assert_eq!(
            fs::read_to_string(path.with_extension("bak")).unwrap(),
            "not json"
        );
    }

    #[test]
    fn test_manual_overrides_validate() {
        let store = LocalStateStore::in_memory();
        assert!(store.set_energy_balance(-5.0).is_err());
        assert!(store.set_ledger_entry(Channel::C, f64::NAN).is_err());
        assert!(store.set_cash_balance(-1).is_err());

        store.set_ledger_entry(Channel::C, 42.0).unwrap();
        assert!((store.energy_ledger().get(Channel::C) - 42.0).abs() < f64::EPSILON);

        store.restore_defaults().unwrap();
        assert_eq!(store.snapshot(), StoreSnapshot::default());
    }

    #[test]
    fn test_merge_relay_delta() {
        let store = LocalStateStore::in_memory();
        let delta: RelayDelta = [(Channel::B, true)].into_iter().collect();
        let merged = store.merge_relay_delta(&delta).unwrap();
        assert_eq!(merged.active(), ChannelSet::from([Channel::B]));
    }
}
