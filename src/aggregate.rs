//! Daily aggregation.
//!
//! Folds decoded events into per-protocol-day accumulators. Amounts stay in
//! the token's smallest unit as `U256` the whole way, so repeated merges are
//! exact. A day record is recomputable from scratch: for any day and
//! category, the stored sum equals the sum over all events resolving to that
//! day.

use crate::cache::{Amount, ProtocolDayRecord};
use crate::day::protocol_day;
use crate::errors::SyncError;
use crate::onchain::RawEvent;
use crate::timestamps::BlockTimestamps;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Aggregate `events` into per-day records using resolved block timestamps.
///
/// The resolver guarantees a complete mapping; a missing block here means the
/// caller skipped resolution and the run must not proceed.
pub fn aggregate(
    events: &[RawEvent],
    timestamps: &BlockTimestamps,
    epoch_start: u64,
) -> Result<BTreeMap<u32, ProtocolDayRecord>, SyncError> {
    let now = Utc::now().to_rfc3339();
    let mut days: BTreeMap<u32, ProtocolDayRecord> = BTreeMap::new();

    for event in events {
        let timestamp = *timestamps
            .get(&event.block_number)
            .ok_or(SyncError::TimestampResolution {
                block: event.block_number,
            })?;
        let day = protocol_day(timestamp, epoch_start);

        let record = days
            .entry(day)
            .or_insert_with(|| ProtocolDayRecord::empty(day, now.clone()));
        *record.event_counts.entry(event.category).or_insert(0) += 1;
        let amount = record
            .amounts
            .entry(event.category)
            .or_insert(Amount::ZERO);
        *amount += event.amount;
    }

    debug!(
        events = events.len(),
        days = days.len(),
        "aggregated events into day records"
    );
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onchain::EventCategory;
    use alloy_primitives::{Address, U256};

    const EPOCH: u64 = 1_752_192_000;

    fn event(category: EventCategory, amount: u64, block: u64) -> RawEvent {
        RawEvent {
            address: Address::ZERO,
            category,
            amount: U256::from(amount),
            block_number: block,
            transaction_hash: None,
            log_index: 0,
        }
    }

    #[test]
    fn sums_counts_and_amounts_per_category() {
        let events = vec![
            event(EventCategory::Stake, 1_000, 50),
            event(EventCategory::Stake, 500, 60),
            event(EventCategory::Burn, 42, 60),
        ];
        let timestamps: BlockTimestamps =
            [(50, EPOCH + 100), (60, EPOCH + 200)].into_iter().collect();

        let days = aggregate(&events, &timestamps, EPOCH).unwrap();
        assert_eq!(days.len(), 1);
        let record = &days[&1];
        assert_eq!(record.event_counts[&EventCategory::Stake], 2);
        assert_eq!(record.event_counts[&EventCategory::Burn], 1);
        assert_eq!(record.amounts[&EventCategory::Stake].0, U256::from(1_500));
        assert_eq!(record.amounts[&EventCategory::Burn].0, U256::from(42));
    }

    #[test]
    fn events_split_across_days() {
        let events = vec![
            event(EventCategory::Create, 7, 10),
            event(EventCategory::Create, 9, 20),
        ];
        let timestamps: BlockTimestamps = [(10, EPOCH + 100), (20, EPOCH + 3 * 86_400)]
            .into_iter()
            .collect();

        let days = aggregate(&events, &timestamps, EPOCH).unwrap();
        assert_eq!(days.keys().copied().collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn pre_epoch_events_land_on_day_one() {
        let events = vec![event(EventCategory::Stake, 3, 5)];
        let timestamps: BlockTimestamps = [(5, EPOCH - 1_000_000)].into_iter().collect();

        let days = aggregate(&events, &timestamps, EPOCH).unwrap();
        assert_eq!(days.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn missing_timestamp_is_fatal() {
        let events = vec![event(EventCategory::Stake, 3, 99)];
        let timestamps = BlockTimestamps::new();
        assert!(matches!(
            aggregate(&events, &timestamps, EPOCH),
            Err(SyncError::TimestampResolution { block: 99 })
        ));
    }
}
