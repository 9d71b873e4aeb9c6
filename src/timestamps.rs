//! Block timestamp resolution.
//!
//! Every fetched event needs its block's timestamp before it can be bucketed
//! into a protocol day. Lookups are deduplicated and fanned out in small
//! bounded batches. Unlike sub-range fetching there is no partial tolerance
//! here: one unresolved block would corrupt every aggregate downstream, so
//! the first block to exhaust its retries fails the run.

use crate::errors::SyncError;
use crate::node::EndpointPool;
use crate::onchain::RawEvent;
use futures::{StreamExt, stream};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Block number to UNIX seconds, complete for every requested block
pub type BlockTimestamps = HashMap<u64, u64>;

pub struct TimestampResolver {
    pool: Arc<EndpointPool>,
    batch_size: usize,
    retry_limit: usize,
}

impl TimestampResolver {
    pub fn new(pool: Arc<EndpointPool>, batch_size: usize, retry_limit: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            retry_limit: retry_limit.max(1),
        }
    }

    /// Collect the deduplicated block set referenced by `events`
    pub fn blocks_of(events: &[RawEvent]) -> BTreeSet<u64> {
        events.iter().map(|event| event.block_number).collect()
    }

    /// Resolve every block in `blocks` to its timestamp. Total: either all
    /// blocks resolve or the whole call fails.
    pub async fn resolve(&self, blocks: &BTreeSet<u64>) -> Result<BlockTimestamps, SyncError> {
        debug!(blocks = blocks.len(), "resolving block timestamps");

        let resolved: Vec<Result<(u64, u64), SyncError>> = stream::iter(blocks.iter().copied())
            .map(|block| self.resolve_one(block))
            .buffer_unordered(self.batch_size)
            .collect()
            .await;

        let mut timestamps = BlockTimestamps::with_capacity(blocks.len());
        for entry in resolved {
            let (block, timestamp) = entry?;
            timestamps.insert(block, timestamp);
        }
        Ok(timestamps)
    }

    async fn resolve_one(&self, block: u64) -> Result<(u64, u64), SyncError> {
        for attempt in 1..=self.retry_limit {
            let (endpoint, _head) = self.pool.acquire().await?;
            match endpoint.client().block_timestamp(block).await {
                Ok(timestamp) => {
                    endpoint.mark_success();
                    return Ok((block, timestamp));
                }
                Err(e) => {
                    endpoint.mark_failure();
                    warn!(
                        block,
                        attempt,
                        endpoint = endpoint.label(),
                        error = %e,
                        "timestamp lookup failed"
                    );
                    let jitter = fastrand::u64(0..=500);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
            }
        }
        Err(SyncError::TimestampResolution { block })
    }
}
