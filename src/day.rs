//! Protocol day calculation.
//!
//! This is the single source of truth for mapping a block timestamp onto an
//! integer protocol day. Every aggregation path goes through this function so
//! that all categories bucket events identically.

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Maps a UNIX timestamp to the protocol day it falls on.
///
/// Day 1 starts at `epoch_start`. Timestamps before the epoch clamp to day 1
/// rather than being discarded, so events emitted during contract deployment
/// still land in the first bucket.
pub fn protocol_day(timestamp: u64, epoch_start: u64) -> u32 {
    if timestamp < epoch_start {
        return 1;
    }
    ((timestamp - epoch_start) / SECONDS_PER_DAY + 1) as u32
}
