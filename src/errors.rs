//! Error taxonomy for a sync run. Every retry loop upstream is bounded, so
//! each of these surfaces at most once per run and aborts it.

use crate::fetcher::BlockRange;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("no endpoint in the pool passed a liveness probe")]
    EndpointUnavailable,
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("block ranges could not be fetched after retries: {0:?}")]
    RangeGaps(Vec<BlockRange>),
    #[error("failed to resolve timestamp for block {block}")]
    TimestampResolution { block: u64 },
    #[error("cache file not found")]
    CacheNotFound,
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("run deadline of {0}s exceeded")]
    DeadlineExceeded(u64),
}
