//! Incremental on-chain event synchronization into a merged JSON cache.
//!
//! One linear pipeline per run: rotate across configured RPC endpoints,
//! fetch protocol events in bounded block ranges, resolve block timestamps,
//! bucket everything into protocol days with exact integer arithmetic, and
//! additively merge the result into a single cache document shared with
//! external collaborators.

pub use aggregate::aggregate;
pub use builder::SyncerBuilder;
pub use cache::{Amount, CacheDocument, CacheStore, ProtocolDayRecord, merge};
pub use config::{DEFAULT_EPOCH_START, SyncConfig};
pub use day::protocol_day;
pub use errors::SyncError;
pub use fetcher::{BlockRange, EventFetcher, FetchOutcome};
pub use node::{Endpoint, EndpointPool, HttpNodeClient, NodeClient};
pub use onchain::{EventCategory, ProtocolEvents, RawEvent, decode_event};
pub use sync::{RunSummary, Syncer};
pub use timestamps::{BlockTimestamps, TimestampResolver};

mod aggregate;
mod builder;
mod cache;
mod config;
mod day;
mod errors;
mod fetcher;
mod node;
mod onchain;
mod sync;
mod timestamps;
mod util;
