//! Node access and endpoint rotation.
//!
//! Public RPC providers have uncorrelated availability, so the pool keeps an
//! ordered endpoint list and hands out the first one that answers a cheap
//! block-height probe within the timeout. Acquisition walks the list at most
//! once per call; a full lap of failures is `EndpointUnavailable`.

use crate::errors::SyncError;
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::{BlockNumberOrTag, Filter, Log};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The subset of the execution-layer api the sync pipeline needs. A trait
/// seam so tests can drive the pipeline against a scripted node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, SyncError>;
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, SyncError>;
    async fn block_timestamp(&self, number: u64) -> Result<u64, SyncError>;
}

/// [`NodeClient`] backed by an alloy http provider
pub struct HttpNodeClient {
    provider: Arc<RootProvider>,
}

impl HttpNodeClient {
    pub fn new(url: &str) -> Result<Self, SyncError> {
        let parsed = url
            .parse()
            .map_err(|e| SyncError::InvalidConfig(format!("endpoint url {url}: {e}")))?;
        let provider = Arc::new(ProviderBuilder::default().connect_http(parsed));
        Ok(Self { provider })
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn block_number(&self) -> Result<u64, SyncError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| SyncError::ProviderError(format!("eth_blockNumber: {e}")))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, SyncError> {
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| SyncError::ProviderError(format!("eth_getLogs: {e}")))
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, SyncError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| SyncError::ProviderError(format!("eth_getBlockByNumber: {e}")))?
            .ok_or_else(|| SyncError::ProviderError(format!("block {number} not found")))?;
        Ok(block.header.timestamp)
    }
}

#[derive(Debug, Default)]
struct EndpointState {
    consecutive_failures: u32,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
}

/// One endpoint url plus its in-memory liveness state. State is rebuilt each
/// process run.
pub struct Endpoint {
    label: String,
    client: Arc<dyn NodeClient>,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    pub fn new(label: impl Into<String>, client: Arc<dyn NodeClient>) -> Self {
        Self {
            label: label.into(),
            client,
            state: Mutex::new(EndpointState::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn client(&self) -> &Arc<dyn NodeClient> {
        &self.client
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn mark_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.last_success = Some(Instant::now());
    }

    pub fn mark_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        state.last_failure = Some(Instant::now());
    }
}

/// Ordered endpoint list with round-robin acquisition
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    cursor: Mutex<usize>,
    probe_timeout: Duration,
}

impl EndpointPool {
    pub fn new(endpoints: Vec<Arc<Endpoint>>, probe_timeout: Duration) -> Result<Self, SyncError> {
        if endpoints.is_empty() {
            return Err(SyncError::InvalidConfig("no endpoints configured".into()));
        }
        Ok(Self {
            endpoints,
            cursor: Mutex::new(0),
            probe_timeout,
        })
    }

    pub fn from_urls(urls: &[String], probe_timeout: Duration) -> Result<Self, SyncError> {
        let endpoints = urls
            .iter()
            .map(|url| {
                HttpNodeClient::new(url)
                    .map(|client| Arc::new(Endpoint::new(url.clone(), Arc::new(client) as _)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints, probe_timeout)
    }

    /// Probe endpoints in round-robin order and return the first live one
    /// together with the head block its probe reported. Each endpoint is
    /// tried at most once per acquisition.
    pub async fn acquire(&self) -> Result<(Arc<Endpoint>, u64), SyncError> {
        let start = {
            let mut cursor = self.cursor.lock();
            let start = *cursor;
            *cursor = (*cursor + 1) % self.endpoints.len();
            start
        };

        for offset in 0..self.endpoints.len() {
            let endpoint = &self.endpoints[(start + offset) % self.endpoints.len()];
            match tokio::time::timeout(self.probe_timeout, endpoint.client.block_number()).await {
                Ok(Ok(head)) => {
                    endpoint.mark_success();
                    debug!(endpoint = endpoint.label(), head, "endpoint probe ok");
                    return Ok((endpoint.clone(), head));
                }
                Ok(Err(e)) => {
                    endpoint.mark_failure();
                    warn!(endpoint = endpoint.label(), error = %e, "endpoint probe failed, rotating");
                }
                Err(_) => {
                    endpoint.mark_failure();
                    warn!(
                        endpoint = endpoint.label(),
                        timeout_ms = self.probe_timeout.as_millis() as u64,
                        "endpoint probe timed out, rotating"
                    );
                }
            }
        }
        Err(SyncError::EndpointUnavailable)
    }
}
