//! Run configuration.
//!
//! Loaded from a TOML file with every field defaulted, so a minimal config
//! only needs the endpoint list and the protocol contract address. The
//! `EVENT_SYNC_RPC` environment variable (comma separated URLs, usually via a
//! `.env` file) overrides the configured endpoints for local runs.

use crate::errors::SyncError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Authoritative protocol genesis, 2025-07-11T00:00:00Z.
///
/// The deployed contract's genesis event is the real source for this value;
/// deployments against other networks must override `epoch_start` in config.
pub const DEFAULT_EPOCH_START: u64 = 1_752_192_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ordered JSON-RPC endpoint urls, tried round-robin
    pub endpoints: Vec<String>,
    /// Protocol contract emitting the events we aggregate
    pub contract: String,
    /// UNIX seconds of protocol day 1
    pub epoch_start: u64,
    /// Block to start from when no cache exists yet
    pub genesis_block: u64,
    /// Path of the merged cache document
    pub cache_path: PathBuf,
    /// Copy the previous cache to a timestamped path before overwriting
    pub backup: bool,
    /// Largest block span for a single get_logs call
    pub max_range_per_call: u64,
    /// Attempts per sub-range before it is reported as a gap
    pub fetch_retry_limit: usize,
    /// Sub-range queries in flight at once
    pub fetch_concurrency: usize,
    /// Block timestamp lookups in flight at once
    pub timestamp_batch_size: usize,
    /// Attempts per block timestamp lookup
    pub timestamp_retry_limit: usize,
    /// Endpoint liveness probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Abort the whole run after this many seconds, leaving the cache untouched
    pub deadline_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            contract: String::new(),
            epoch_start: DEFAULT_EPOCH_START,
            genesis_block: 0,
            cache_path: PathBuf::from("protocol_cache.json"),
            backup: true,
            max_range_per_call: 5_000,
            fetch_retry_limit: 5,
            fetch_concurrency: 1,
            timestamp_batch_size: 10,
            timestamp_retry_limit: 3,
            probe_timeout_secs: 3,
            deadline_secs: None,
        }
    }
}

impl SyncConfig {
    /// Load config from a TOML file, or fall back to defaults when no path is
    /// given. Endpoint urls in `EVENT_SYNC_RPC` win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)
                    .map_err(|e| SyncError::InvalidConfig(format!("{}: {e}", path.display())))?
            }
            None => Self::default(),
        };

        if let Ok(urls) = std::env::var("EVENT_SYNC_RPC") {
            config.endpoints = urls
                .split(',')
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            endpoints = ["https://rpc.example.org"]
            contract = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_range_per_call, 5_000);
        assert_eq!(config.epoch_start, DEFAULT_EPOCH_START);
        assert!(config.backup);
        assert_eq!(config.endpoints.len(), 1);
    }
}
