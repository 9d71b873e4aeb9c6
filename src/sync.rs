//! The synchronization run.
//!
//! One linear pipeline per invocation: load the cache, pick the block range
//! from the cursor, fetch, resolve timestamps, aggregate, merge, persist.
//! Nothing touches disk until the very end, so any abort leaves the previous
//! cache and cursor exactly as they were.

use crate::aggregate::aggregate;
use crate::cache::{CacheDocument, CacheStore, ProtocolDayRecord, merge};
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::fetcher::EventFetcher;
use crate::node::EndpointPool;
use crate::timestamps::TimestampResolver;
use alloy_primitives::Address;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What a run did, for the caller's logging and the dry-run report
#[derive(Debug)]
pub struct RunSummary {
    pub from_block: u64,
    pub to_block: u64,
    pub events: usize,
    pub days_touched: Vec<u32>,
    pub dry_run: bool,
}

pub struct Syncer {
    pub(crate) config: SyncConfig,
    pub(crate) contract: Address,
    pub(crate) pool: Arc<EndpointPool>,
    pub(crate) store: CacheStore,
    pub(crate) from_block_override: Option<u64>,
    pub(crate) dry_run: bool,
}

impl Syncer {
    /// Execute one sync run, honoring the configured wall-clock deadline.
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        match self.config.deadline_secs {
            Some(secs) => {
                tokio::time::timeout(Duration::from_secs(secs), self.run_pipeline())
                    .await
                    .unwrap_or_else(|_| {
                        error!(deadline_secs = secs, "run deadline exceeded, cache untouched");
                        Err(SyncError::DeadlineExceeded(secs))
                    })
            }
            None => self.run_pipeline().await,
        }
    }

    async fn run_pipeline(&self) -> Result<RunSummary, SyncError> {
        // Load prior state; a missing cache means a first sync from genesis
        let (mut document, first_sync) = match self.store.load() {
            Ok(document) => (document, false),
            Err(SyncError::CacheNotFound) => {
                info!(
                    genesis_block = self.config.genesis_block,
                    "no cache found, starting from genesis"
                );
                (CacheDocument::genesis(self.config.genesis_block), true)
            }
            Err(e) => return Err(e),
        };

        let (_, head) = self.pool.acquire().await?;

        // Cursor discipline: each block is aggregated and merged exactly
        // once, so the range is always [cursor + 1, head] unless the caller
        // forces a re-sync. A first sync has no processed blocks yet, so the
        // genesis block itself is included in the range.
        let from_block = match self.from_block_override {
            Some(from) => {
                warn!(from, "forced re-sync override, merged days may double-count");
                from
            }
            None if first_sync => self.config.genesis_block,
            None => document.last_processed_block + 1,
        };

        if from_block > head {
            info!(cursor = document.last_processed_block, head, "no new blocks");
            return Ok(RunSummary {
                from_block,
                to_block: head,
                events: 0,
                days_touched: Vec::new(),
                dry_run: self.dry_run,
            });
        }

        info!(from_block, to_block = head, "syncing event range");
        let fetcher = EventFetcher::new(self.pool.clone(), self.contract, &self.config);
        let outcome = fetcher.fetch_events(from_block, head).await?;
        if !outcome.gaps.is_empty() {
            // An uncovered range would silently under-count a financial
            // aggregate, abort instead.
            error!(gaps = ?outcome.gaps, "aborting: block ranges left uncovered");
            return Err(SyncError::RangeGaps(outcome.gaps));
        }

        let resolver = TimestampResolver::new(
            self.pool.clone(),
            self.config.timestamp_batch_size,
            self.config.timestamp_retry_limit,
        );
        let blocks = TimestampResolver::blocks_of(&outcome.events);
        let timestamps = resolver.resolve(&blocks).await?;

        let new_records = aggregate(&outcome.events, &timestamps, self.config.epoch_start)?;
        let days_touched: Vec<u32> = new_records.keys().copied().collect();

        if self.dry_run {
            print_diff(&document, &new_records);
            info!(
                events = outcome.events.len(),
                days = days_touched.len(),
                "dry run complete, cache untouched"
            );
        } else {
            merge(&mut document, &new_records);
            document.last_processed_block = document.last_processed_block.max(head);
            self.store.save(&document)?;
            info!(
                events = outcome.events.len(),
                days = days_touched.len(),
                cursor = document.last_processed_block,
                "sync complete"
            );
        }

        Ok(RunSummary {
            from_block,
            to_block: head,
            events: outcome.events.len(),
            days_touched,
            dry_run: self.dry_run,
        })
    }
}

/// Per-day diff a dry run would have merged
fn print_diff(document: &CacheDocument, new_records: &BTreeMap<u32, ProtocolDayRecord>) {
    if new_records.is_empty() {
        println!("dry run: no day records would change");
        return;
    }
    for (day, record) in new_records {
        let existing = document.day_record(*day);
        println!(
            "day {day} ({}):",
            if existing.is_some() { "update" } else { "new" }
        );
        for (category, count) in &record.event_counts {
            let current = existing
                .and_then(|rec| rec.event_counts.get(category))
                .copied()
                .unwrap_or(0);
            let amount = record.amounts.get(category).copied().unwrap_or_default();
            println!(
                "  {category}: +{count} events (-> {}), +{} amount",
                current + count,
                amount.0
            );
        }
    }
}
