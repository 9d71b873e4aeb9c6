//! Chunked event fetching.
//!
//! `[from, to]` is split into sub-ranges no wider than the configured cap,
//! each fetched with a bounded retry budget: rotate to a freshly probed
//! endpoint, sleep with jitter, and halve the range when the provider rejects
//! it. A sub-range that exhausts its budget becomes an explicit gap in the
//! outcome instead of being silently dropped, so the caller can abort rather
//! than under-count.

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::node::EndpointPool;
use crate::onchain::{EventCategory, RawEvent, decode_event};
use crate::util::create_progress_bar;
use alloy_primitives::Address;
use alloy_rpc_types::Filter;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Inclusive block range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn width(&self) -> u64 {
        self.to - self.from + 1
    }

    fn halves(&self) -> (BlockRange, BlockRange) {
        let mid = self.from + (self.width() / 2) - 1;
        (
            BlockRange::new(self.from, mid),
            BlockRange::new(mid + 1, self.to),
        )
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Result of a chunked fetch: decoded events in ascending block order plus
/// the sub-ranges that could not be covered.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub events: Vec<RawEvent>,
    pub gaps: Vec<BlockRange>,
}

pub struct EventFetcher {
    pool: Arc<EndpointPool>,
    contract: Address,
    max_range_per_call: u64,
    retry_limit: usize,
    concurrency: usize,
}

impl EventFetcher {
    pub fn new(pool: Arc<EndpointPool>, contract: Address, config: &SyncConfig) -> Self {
        Self {
            pool,
            contract,
            max_range_per_call: config.max_range_per_call.max(1),
            retry_limit: config.fetch_retry_limit.max(1),
            concurrency: config.fetch_concurrency.max(1),
        }
    }

    /// Fetch and decode all protocol events in `[from, to]` inclusive.
    pub async fn fetch_events(&self, from: u64, to: u64) -> Result<FetchOutcome, SyncError> {
        if from > to {
            return Ok(FetchOutcome::default());
        }

        let filter = Filter::new()
            .address(self.contract)
            .events(EventCategory::signatures());

        let sub_ranges: Vec<BlockRange> = (from..=to)
            .step_by(self.max_range_per_call as usize)
            .map(|start| BlockRange::new(start, (start + self.max_range_per_call - 1).min(to)))
            .collect();

        let progress = create_progress_bar(sub_ranges.len() as u64, "event sync");

        // Fan out over sub-ranges with bounded concurrency. Completion order
        // does not matter, events are reassembled by block below.
        let results: Vec<(BlockRange, Result<Vec<RawEvent>, ()>)> = stream::iter(&sub_ranges)
            .map(|range| {
                let filter = filter.clone();
                let progress = progress.clone();
                async move {
                    let fetched = self.fetch_sub_range(*range, filter).await;
                    progress.inc(1);
                    (*range, fetched)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        progress.finish_and_clear();

        // Futures join out of order block wise, but logs within a block all
        // come from one query and keep their log-index order. Reassembling by
        // block number restores on-chain order.
        let mut ordered: BTreeMap<u64, Vec<RawEvent>> = BTreeMap::new();
        let mut gaps = Vec::new();
        for (range, result) in results {
            match result {
                Ok(events) => {
                    for event in events {
                        ordered.entry(event.block_number).or_default().push(event);
                    }
                }
                Err(()) => gaps.push(range),
            }
        }
        gaps.sort_by_key(|range| range.from);

        Ok(FetchOutcome {
            events: ordered.into_values().flatten().collect(),
            gaps,
        })
    }

    /// Fetch one declared sub-range, shrinking on provider errors. The retry
    /// budget covers every segment the sub-range splits into; once spent, the
    /// whole declared range is reported as a gap.
    async fn fetch_sub_range(
        &self,
        range: BlockRange,
        filter: Filter,
    ) -> Result<Vec<RawEvent>, ()> {
        let mut attempts = 0usize;
        let mut pending: VecDeque<BlockRange> = VecDeque::from([range]);
        let mut events = Vec::new();

        while let Some(segment) = pending.pop_front() {
            loop {
                if attempts >= self.retry_limit {
                    warn!(%range, "retry budget exhausted, recording gap");
                    return Err(());
                }
                attempts += 1;

                let (endpoint, _head) = match self.pool.acquire().await {
                    Ok(acquired) => acquired,
                    Err(_) => {
                        warn!(%range, "no live endpoint for sub-range");
                        return Err(());
                    }
                };

                let scoped = filter
                    .clone()
                    .from_block(segment.from)
                    .to_block(segment.to);
                match endpoint.client().get_logs(&scoped).await {
                    Ok(logs) => {
                        debug!(%segment, logs = logs.len(), endpoint = endpoint.label(), "fetched sub-range");
                        endpoint.mark_success();
                        events.extend(logs.iter().filter_map(decode_event));
                        break;
                    }
                    Err(e) => {
                        endpoint.mark_failure();
                        warn!(%segment, endpoint = endpoint.label(), error = %e, "sub-range fetch failed");

                        // Jittered pause before the next attempt
                        let jitter = fastrand::u64(0..=1000);
                        tokio::time::sleep(Duration::from_millis(jitter)).await;

                        // Providers reject ranges they consider too wide, so
                        // split and work the halves through the same budget.
                        if segment.width() > 1 {
                            let (low, high) = segment.halves();
                            pending.push_front(high);
                            pending.push_front(low);
                            break;
                        }
                    }
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halving_covers_range_without_overlap() {
        let range = BlockRange::new(10, 19);
        let (low, high) = range.halves();
        assert_eq!(low, BlockRange::new(10, 14));
        assert_eq!(high, BlockRange::new(15, 19));

        let odd = BlockRange::new(0, 2);
        let (low, high) = odd.halves();
        assert_eq!(low, BlockRange::new(0, 0));
        assert_eq!(high, BlockRange::new(1, 2));
    }

    #[test]
    fn width_is_inclusive() {
        assert_eq!(BlockRange::new(5, 5).width(), 1);
        assert_eq!(BlockRange::new(0, 4999).width(), 5_000);
    }
}
