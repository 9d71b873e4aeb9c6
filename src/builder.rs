//! Builder for a [`Syncer`].
//!
//! Validates configuration up front so a run either starts with everything
//! it needs or fails before any network call. Tests inject their own
//! endpoint pool through [`SyncerBuilder::endpoint_pool`].

use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::node::EndpointPool;
use crate::sync::Syncer;
use alloy_primitives::Address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct SyncerBuilder {
    config: Option<SyncConfig>,
    pool: Option<Arc<EndpointPool>>,
    from_block: Option<u64>,
    dry_run: bool,
}

impl SyncerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a pre-built endpoint pool instead of dialing the configured urls
    pub fn endpoint_pool(mut self, pool: Arc<EndpointPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Force the sync to restart from this block, ignoring the cursor
    pub fn from_block(mut self, from_block: Option<u64>) -> Self {
        self.from_block = from_block;
        self
    }

    /// Run the full pipeline but print the diff instead of persisting
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<Syncer, SyncError> {
        let config = self
            .config
            .ok_or_else(|| SyncError::InvalidConfig("config not set".into()))?;

        let contract = Address::from_str(&config.contract).map_err(|_| {
            SyncError::InvalidConfig(format!("bad contract address: {:?}", config.contract))
        })?;

        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(EndpointPool::from_urls(
                &config.endpoints,
                Duration::from_secs(config.probe_timeout_secs),
            )?),
        };

        // Dry runs never write, so the backup toggle is irrelevant for them
        let store = CacheStore::new(config.cache_path.clone(), config.backup);

        Ok(Syncer {
            contract,
            pool,
            store,
            from_block_override: self.from_block,
            dry_run: self.dry_run,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_config() {
        assert!(matches!(
            SyncerBuilder::new().build(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn build_rejects_bad_contract_address() {
        let config = SyncConfig {
            endpoints: vec!["https://rpc.example.org".into()],
            contract: "not-an-address".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(
            SyncerBuilder::new().config(config).build(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn build_rejects_empty_endpoint_list() {
        let config = SyncConfig {
            contract: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(
            SyncerBuilder::new().config(config).build(),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
