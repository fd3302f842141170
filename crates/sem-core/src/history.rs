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

//! Trade history queries and CSV export.

use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use sem_types::{Channel, TradeRecord};
use serde::Serialize;

/// Filter over the trade history. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub channel: Option<Channel>,
    /// Calendar day (UTC)
    pub date: Option<NaiveDate>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn matches(&self, record: &TradeRecord) -> bool {
        if let Some(channel) = self.channel
            && !record.involves(channel)
        {
            return false;
        }
        if let Some(date) = self.date
            && record.timestamp.date_naive() != date
        {
            return false;
        }
        if self.since.is_some_and(|since| record.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.timestamp > until) {
            return false;
        }
        true
    }

    /// Matching records, preserving most-recent-first order.
    pub fn apply(&self, records: &[TradeRecord]) -> Vec<TradeRecord> {
        records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }
}

#[derive(Serialize)]
struct CsvRow {
    timestamp: String,
    channels: String,
    total_watt: f64,
    total_price: i64,
}

/// Write `records` as CSV with a header row.
pub fn write_csv<W: Write>(records: &[TradeRecord], writer: W) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for record in records {
        out.serialize(CsvRow {
            timestamp: record.timestamp.to_rfc3339(),
            channels: record
                .channels
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            total_watt: record.total_watt,
            total_price: record.total_price,
        })?;
    }
    out.flush()?;
    Ok(())
}
