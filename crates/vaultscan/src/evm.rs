//! The capabilities the engine consumes from its embedding (§6): `EvmClient` for calls and
//! chain metadata, `EventSource` for log scanning. Keeping these as traits rather than a
//! concrete provider type lets discovery/classification/the reader be driven by an
//! in-memory fake in tests, with no network access, per the testing scenarios in §8.

use std::sync::Arc;

use alloy_primitives::{Address as AlloyAddress, Bytes, B256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{BlockId, BlockNumberOrTag, Filter, Log as AlloyLog, TransactionRequest};
use async_trait::async_trait;

use crate::error::ScanError;

/// A single on-chain event log, trimmed to the fields discovery needs.
#[derive(Debug, Clone)]
pub struct Log {
    pub address: AlloyAddress,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
}

impl From<AlloyLog> for Log {
    fn from(log: AlloyLog) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number.unwrap_or_default(),
            transaction_hash: log.transaction_hash,
        }
    }
}

/// A log filter: address set (empty = any address) and topic0 set (empty = any topic).
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub addresses: Vec<AlloyAddress>,
    pub topics: Vec<B256>,
}

/// The chain-call capability the core requires of its embedding.
#[async_trait]
pub trait EvmClient: Send + Sync {
    fn chain_id(&self) -> u32;

    async fn call(&self, target: AlloyAddress, data: Bytes, block: u64) -> Result<Bytes, ScanError>;

    async fn multicall_available(&self, block: u64) -> Result<bool, ScanError>;

    async fn get_block_timestamp(&self, block: u64) -> Result<u64, ScanError>;

    /// The chain's current tip, used by the CLI to pick a `to_block` when the operator
    /// hasn't pinned one via `END_BLOCK`.
    async fn latest_block(&self) -> Result<u64, ScanError>;

    /// Reads a raw storage slot at `address`, used to resolve an EIP-1967 proxy's
    /// implementation address for the registry rows that opt into it (§4.4/§9).
    async fn get_storage_at(&self, address: AlloyAddress, slot: B256, block: u64) -> Result<B256, ScanError>;
}

/// The event-log capability the core requires of its embedding.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ScanError>;
}

/// An `EvmClient`/`EventSource` backed by a real `alloy` HTTP provider.
pub struct AlloyEvmClient<P> {
    provider: Arc<P>,
    chain_id: u32,
}

/// The concrete client type every CLI command connects: a plain HTTP `alloy` provider.
/// Named so callers don't have to spell out the nested provider/transport generics.
pub type HttpEvmClient = AlloyEvmClient<alloy_provider::RootProvider<alloy_transport_http::Http<reqwest::Client>>>;

impl AlloyEvmClient<alloy_provider::RootProvider<alloy_transport_http::Http<reqwest::Client>>> {
    /// Connects over HTTP and asks the node for its chain id via `eth_chainId`, rather than
    /// trusting a caller-supplied value.
    pub async fn connect(json_rpc_url: &str) -> Result<Self, ScanError> {
        let url = json_rpc_url
            .parse()
            .map_err(|e| ScanError::Config(format!("invalid JSON_RPC_URL: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ScanError::transport(e.to_string()))?;
        Ok(Self { provider: Arc::new(provider), chain_id: chain_id as u32 })
    }
}

#[async_trait]
impl<P> EvmClient for AlloyEvmClient<P>
where
    P: Provider + Send + Sync + 'static,
{
    fn chain_id(&self) -> u32 {
        self.chain_id
    }

    async fn call(&self, target: AlloyAddress, data: Bytes, block: u64) -> Result<Bytes, ScanError> {
        let tx = TransactionRequest::default().to(target).input(data.into());
        self.provider
            .call(&tx)
            .block(BlockId::Number(BlockNumberOrTag::Number(block)))
            .await
            .map_err(|e| ScanError::transport(e.to_string()))
    }

    async fn multicall_available(&self, block: u64) -> Result<bool, ScanError> {
        let code = self
            .provider
            .get_code_at(vaultscan_multicall::MULTICALL3_ADDRESS)
            .block_id(BlockId::Number(BlockNumberOrTag::Number(block)))
            .await
            .map_err(|e| ScanError::transport(e.to_string()))?;
        Ok(!code.is_empty())
    }

    async fn get_block_timestamp(&self, block: u64) -> Result<u64, ScanError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block), false)
            .await
            .map_err(|e| ScanError::transport(e.to_string()))?
            .ok_or_else(|| ScanError::transport(format!("block {block} not found")))?;
        Ok(block.header.timestamp)
    }

    async fn latest_block(&self) -> Result<u64, ScanError> {
        self.provider.get_block_number().await.map_err(|e| ScanError::transport(e.to_string()))
    }

    async fn get_storage_at(&self, address: AlloyAddress, slot: B256, block: u64) -> Result<B256, ScanError> {
        let value = self
            .provider
            .get_storage_at(address, slot.into())
            .block_id(BlockId::Number(BlockNumberOrTag::Number(block)))
            .await
            .map_err(|e| ScanError::transport(e.to_string()))?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }
}

#[async_trait]
impl<P> EventSource for AlloyEvmClient<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ScanError> {
        let mut f = Filter::new().from_block(from_block).to_block(to_block);
        if !filter.addresses.is_empty() {
            f = f.address(filter.addresses.clone());
        }
        if let Some(topic0) = filter.topics.first() {
            f = f.event_signature(*topic0);
        }

        let logs = self
            .provider
            .get_logs(&f)
            .await
            .map_err(|e| ScanError::transport(e.to_string()))?;

        Ok(logs.into_iter().map(Log::from).collect())
    }
}
