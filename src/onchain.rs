//! Protocol event definitions and log decoding.
//!
//! One filter carries every signature we care about, so decoding dispatches
//! on topic0. Logs with an unknown topic or a payload that fails to decode
//! are skipped, never counted.

use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types::Log;
use alloy_sol_types::{SolEvent, sol};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

sol!(
    #[derive(Debug)]
    contract ProtocolEvents {
        event Stake(address indexed account, uint256 indexed stakeId, uint256 principal, uint256 term);
        event Create(address indexed account, uint256 indexed tokenId, uint256 amount);
        event Build(address indexed account, uint256 amount);
        event Burn(address indexed account, uint256 amount);
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
);

/// Aggregation bucket for an on-chain event. Serialized names match the keys
/// the dashboard reads out of the cache document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    #[serde(rename = "stakes")]
    Stake,
    #[serde(rename = "creates")]
    Create,
    #[serde(rename = "builds")]
    Build,
    #[serde(rename = "burns")]
    Burn,
    #[serde(rename = "transfers")]
    Transfer,
}

impl EventCategory {
    /// Event signatures used to build the log filter
    pub fn signatures() -> [&'static str; 5] {
        [
            ProtocolEvents::Stake::SIGNATURE,
            ProtocolEvents::Create::SIGNATURE,
            ProtocolEvents::Build::SIGNATURE,
            ProtocolEvents::Burn::SIGNATURE,
            ProtocolEvents::Transfer::SIGNATURE,
        ]
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventCategory::Stake => "stakes",
            EventCategory::Create => "creates",
            EventCategory::Build => "builds",
            EventCategory::Burn => "burns",
            EventCategory::Transfer => "transfers",
        };
        write!(f, "{name}")
    }
}

/// A decoded on-chain log entry. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub address: Address,
    pub category: EventCategory,
    /// Token amount in its smallest unit
    pub amount: U256,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    pub log_index: u64,
}

/// Decode an rpc log into a [`RawEvent`], dispatching on topic0.
///
/// Returns `None` for logs outside the protocol's event surface.
pub fn decode_event(log: &Log) -> Option<RawEvent> {
    let topic0 = *log.inner.topics().first()?;
    let Some(block_number) = log.block_number else {
        warn!(topic = %topic0, "log without block number, skipping");
        return None;
    };

    let decoded = decode_amount(topic0, log);
    let (category, amount) = match decoded {
        Ok(pair) => pair,
        Err(DecodeSkip::UnknownTopic) => {
            debug!(topic = %topic0, block_number, "unknown event topic, skipping");
            return None;
        }
        Err(DecodeSkip::BadPayload(e)) => {
            warn!(topic = %topic0, block_number, error = %e, "undecodable event payload, skipping");
            return None;
        }
    };

    Some(RawEvent {
        address: log.inner.address,
        category,
        amount,
        block_number,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index.unwrap_or(0),
    })
}

enum DecodeSkip {
    UnknownTopic,
    BadPayload(alloy_sol_types::Error),
}

fn decode_amount(topic0: B256, log: &Log) -> Result<(EventCategory, U256), DecodeSkip> {
    let data = &log.inner.data;
    if topic0 == ProtocolEvents::Stake::SIGNATURE_HASH {
        let event = ProtocolEvents::Stake::decode_log_data(data).map_err(DecodeSkip::BadPayload)?;
        Ok((EventCategory::Stake, event.principal))
    } else if topic0 == ProtocolEvents::Create::SIGNATURE_HASH {
        let event =
            ProtocolEvents::Create::decode_log_data(data).map_err(DecodeSkip::BadPayload)?;
        Ok((EventCategory::Create, event.amount))
    } else if topic0 == ProtocolEvents::Build::SIGNATURE_HASH {
        let event = ProtocolEvents::Build::decode_log_data(data).map_err(DecodeSkip::BadPayload)?;
        Ok((EventCategory::Build, event.amount))
    } else if topic0 == ProtocolEvents::Burn::SIGNATURE_HASH {
        let event = ProtocolEvents::Burn::decode_log_data(data).map_err(DecodeSkip::BadPayload)?;
        Ok((EventCategory::Burn, event.amount))
    } else if topic0 == ProtocolEvents::Transfer::SIGNATURE_HASH {
        let event =
            ProtocolEvents::Transfer::decode_log_data(data).map_err(DecodeSkip::BadPayload)?;
        Ok((EventCategory::Transfer, event.value))
    } else {
        Err(DecodeSkip::UnknownTopic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Log as PrimitiveLog, address};

    fn rpc_log(inner: PrimitiveLog, block_number: u64, log_index: u64) -> Log {
        Log {
            inner,
            block_hash: None,
            block_number: Some(block_number),
            block_timestamp: None,
            transaction_hash: Some(B256::ZERO),
            transaction_index: None,
            log_index: Some(log_index),
            removed: false,
        }
    }

    #[test]
    fn decodes_stake_principal() {
        let contract = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
        let event = ProtocolEvents::Stake {
            account: address!("0000000000000000000000000000000000000001"),
            stakeId: U256::from(7),
            principal: U256::from(1_000_000u64),
            term: U256::from(88),
        };
        let inner = PrimitiveLog {
            address: contract,
            data: event.encode_log_data(),
        };
        let raw = decode_event(&rpc_log(inner, 42, 3)).unwrap();
        assert_eq!(raw.category, EventCategory::Stake);
        assert_eq!(raw.amount, U256::from(1_000_000u64));
        assert_eq!(raw.block_number, 42);
        assert_eq!(raw.log_index, 3);
    }

    #[test]
    fn unknown_topic_is_skipped() {
        let inner = PrimitiveLog {
            address: Address::ZERO,
            data: alloy_primitives::LogData::new_unchecked(vec![B256::repeat_byte(0xab)], vec![].into()),
        };
        assert!(decode_event(&rpc_log(inner, 1, 0)).is_none());
    }

    #[test]
    fn category_names_match_dashboard_keys() {
        let json = serde_json::to_string(&EventCategory::Stake).unwrap();
        assert_eq!(json, "\"stakes\"");
        let back: EventCategory = serde_json::from_str("\"burns\"").unwrap();
        assert_eq!(back, EventCategory::Burn);
    }
}
