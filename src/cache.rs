//! The merged cache document: day records, additive merge, and atomic
//! persistence.
//!
//! The document on disk is shared with external collaborators that write
//! their own top-level sections (pool state, price quotes, manual overrides).
//! This module owns only the day-record array and the sync metadata;
//! everything else rides through a flattened passthrough map untouched.

use crate::errors::SyncError;
use crate::onchain::EventCategory;
use alloy_primitives::U256;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Token amount in its smallest unit. Serializes as a decimal string, never
/// hex and never floating point, matching what the dashboard parses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);
}

impl std::ops::AddAssign<U256> for Amount {
    fn add_assign(&mut self, rhs: U256) {
        self.0 += rhs;
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let value = U256::from_str(&raw).map_err(serde::de::Error::custom)?;
        Ok(Amount(value))
    }
}

/// Per-protocol-day accumulator, the unit of aggregation and merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDayRecord {
    pub day: u32,
    #[serde(default)]
    pub event_counts: BTreeMap<EventCategory, u64>,
    #[serde(default)]
    pub amounts: BTreeMap<EventCategory, Amount>,
    pub last_updated: String,
}

impl ProtocolDayRecord {
    pub fn empty(day: u32, last_updated: String) -> Self {
        Self {
            day,
            event_counts: BTreeMap::new(),
            amounts: BTreeMap::new(),
            last_updated,
        }
    }
}

/// The full persisted JSON structure. `sections` carries every top-level key
/// this core does not own, preserved byte-for-byte across a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDocument {
    pub last_updated: String,
    /// Sync cursor: highest block whose events have been merged. Only ever
    /// advances, and only after a successful save.
    pub last_processed_block: u64,
    #[serde(default)]
    pub daily: Vec<ProtocolDayRecord>,
    #[serde(flatten)]
    pub sections: serde_json::Map<String, serde_json::Value>,
}

impl CacheDocument {
    /// Fresh document for a first sync from genesis
    pub fn genesis(genesis_block: u64) -> Self {
        Self {
            last_updated: Utc::now().to_rfc3339(),
            last_processed_block: genesis_block,
            daily: Vec::new(),
            sections: serde_json::Map::new(),
        }
    }

    pub fn day_record(&self, day: u32) -> Option<&ProtocolDayRecord> {
        self.daily.iter().find(|record| record.day == day)
    }
}

/// Additively merge freshly aggregated day records into the document.
///
/// Counts and amounts are added, never replaced: new records describe events
/// discovered since the last sync, not a recomputation. Idempotence is the
/// caller's responsibility through cursor discipline, merging the same block
/// range twice double-counts.
pub fn merge(document: &mut CacheDocument, new_records: &BTreeMap<u32, ProtocolDayRecord>) {
    let now = Utc::now().to_rfc3339();
    for (day, new_record) in new_records {
        match document.daily.iter_mut().find(|record| record.day == *day) {
            Some(existing) => {
                for (category, count) in &new_record.event_counts {
                    *existing.event_counts.entry(*category).or_insert(0) += count;
                }
                for (category, amount) in &new_record.amounts {
                    *existing.amounts.entry(*category).or_insert(Amount::ZERO) += *amount;
                }
                existing.last_updated = now.clone();
            }
            None => {
                let position = document
                    .daily
                    .partition_point(|record| record.day < *day);
                document.daily.insert(position, new_record.clone());
            }
        }
    }
    document.last_updated = now;
}

/// Cache file access: load, and whole-document atomic replacement
pub struct CacheStore {
    path: PathBuf,
    backup: bool,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>, backup: bool) -> Self {
        Self {
            path: path.into(),
            backup,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the prior document. `CacheNotFound` means this is a first sync
    /// and the caller starts from genesis.
    pub fn load(&self) -> Result<CacheDocument, SyncError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::CacheNotFound);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the full document. A concurrent reader sees either the old file
    /// or the new one, never a partial write: the document lands in a temp
    /// file next to the target and is renamed over it.
    pub fn save(&self, document: &CacheDocument) -> Result<(), SyncError> {
        if self.backup && self.path.exists() {
            let backup_path = self.backup_path();
            std::fs::copy(&self.path, &backup_path)?;
            debug!(backup = %backup_path.display(), "backed up previous cache");
        }

        let json = serde_json::to_string_pretty(document)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        info!(
            path = %self.path.display(),
            last_processed_block = document.last_processed_block,
            "cache saved"
        );
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache.json".to_string());
        self.path.with_file_name(format!("{name}.{stamp}.bak"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(day: u32, count: u64, amount: u64) -> ProtocolDayRecord {
        let mut rec = ProtocolDayRecord::empty(day, "2025-07-12T00:00:00Z".into());
        rec.event_counts.insert(EventCategory::Stake, count);
        rec.amounts
            .insert(EventCategory::Stake, Amount(U256::from(amount)));
        rec
    }

    #[test]
    fn merge_adds_counts_and_amounts() {
        let mut doc = CacheDocument::genesis(0);
        doc.daily.push(record(3, 3, 1_000));

        let new_records: BTreeMap<u32, ProtocolDayRecord> = [(3, record(3, 2, 500))].into();
        merge(&mut doc, &new_records);

        let day = doc.day_record(3).unwrap();
        assert_eq!(day.event_counts[&EventCategory::Stake], 5);
        assert_eq!(day.amounts[&EventCategory::Stake].0, U256::from(1_500));
    }

    #[test]
    fn merge_inserts_new_day_in_sorted_position() {
        let mut doc = CacheDocument::genesis(0);
        doc.daily.push(record(1, 1, 10));
        doc.daily.push(record(5, 1, 10));

        let new_records: BTreeMap<u32, ProtocolDayRecord> = [(3, record(3, 1, 10))].into();
        merge(&mut doc, &new_records);

        let days: Vec<u32> = doc.daily.iter().map(|r| r.day).collect();
        assert_eq!(days, vec![1, 3, 5]);
    }

    #[test]
    fn merge_preserves_unowned_sections() {
        let mut doc = CacheDocument::genesis(0);
        doc.sections.insert(
            "poolData".into(),
            json!({"tick": -12345, "liquidity": "987654321"}),
        );
        let expected = doc.sections.clone();

        let new_records: BTreeMap<u32, ProtocolDayRecord> = [(1, record(1, 1, 1))].into();
        merge(&mut doc, &new_records);

        assert_eq!(doc.sections, expected);
    }

    #[test]
    fn double_merge_double_counts() {
        // Demonstrates why the caller must only merge each block range once:
        // merge is additive by design, not idempotent.
        let mut doc = CacheDocument::genesis(0);
        let new_records: BTreeMap<u32, ProtocolDayRecord> = [(2, record(2, 1, 100))].into();

        merge(&mut doc, &new_records);
        merge(&mut doc, &new_records);

        let day = doc.day_record(2).unwrap();
        assert_eq!(day.event_counts[&EventCategory::Stake], 2);
        assert_eq!(day.amounts[&EventCategory::Stake].0, U256::from(200));
    }

    #[test]
    fn amounts_round_trip_as_decimal_strings() {
        let mut rec = record(1, 1, 0);
        rec.amounts.insert(
            EventCategory::Stake,
            Amount(U256::from_str("3000000000000000000").unwrap()),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["amounts"]["stakes"], "3000000000000000000");

        let back: ProtocolDayRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn document_round_trip_keeps_unknown_keys() {
        let raw = json!({
            "lastUpdated": "2025-07-12T00:00:00Z",
            "lastProcessedBlock": 123,
            "daily": [],
            "priceQuotes": {"eth": "3500.12"},
            "manualOverrides": [1, 2, 3]
        });
        let doc: CacheDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.last_processed_block, 123);
        assert_eq!(doc.sections["priceQuotes"]["eth"], "3500.12");

        let out = serde_json::to_value(&doc).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn store_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"), true);
        assert!(matches!(store.load(), Err(SyncError::CacheNotFound)));
    }

    #[test]
    fn store_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"), false);

        let mut doc = CacheDocument::genesis(7);
        doc.daily.push(record(1, 4, 4_000));
        store.save(&doc).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, doc);
        // no stray temp file left behind
        assert!(!dir.path().join("cache.json.tmp").exists());
    }

    #[test]
    fn store_backs_up_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"), true);

        store.save(&CacheDocument::genesis(0)).unwrap();
        store.save(&CacheDocument::genesis(1)).unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
