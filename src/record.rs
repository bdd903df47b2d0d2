//! Pipeline record type.
//!
//! A record is a flat string-to-string map. The filter mutates it in place
//! and guarantees every enrichment field is present afterwards, defaulted to
//! the empty string, so downstream consumers never need presence checks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields the filter always sets on a processed record.
pub const ENRICHMENT_FIELDS: [&str; 8] = [
    "machineId",
    "event",
    "stage",
    "type",
    "severity",
    "mnemonic",
    "device",
    "error",
];

/// One syslog record flowing through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field, empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Reset every enrichment field to empty. Runs before classification
    /// so stale values arriving from upstream never survive processing;
    /// in particular `error` always starts empty.
    pub fn reset_enrichment_fields(&mut self) {
        for key in ENRICHMENT_FIELDS {
            self.0.insert(key.to_string(), String::new());
        }
    }

    /// Append a failure description to the `error` field. The field is
    /// append-only within one record's processing.
    pub fn append_error(&mut self, description: &str) {
        let slot = self.0.entry("error".to_string()).or_default();
        if slot.is_empty() {
            slot.push_str(description);
        } else {
            slot.push_str("; ");
            slot.push_str(description);
        }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Record {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
