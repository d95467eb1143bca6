//! Scan Orchestrator (C8): drives discovery and the historical reader across many chains
//! in parallel, per §4.8 and §5's ordering/cancellation guarantees.
//!
//! One [`ChainWorker`] per enabled chain owns its own `EvmClient`/`EventSource` pair (§5,
//! "no single batcher object is shared across threads; each worker owns its transport
//! client"). Discovery runs to completion for a chain, then every discovered vault's
//! historical read runs concurrently, capped at `Config::max_workers` in-flight reads per
//! chain via a `tokio::sync::Semaphore`. A chain-wide transport failure pauses only that
//! chain; a single vault's failure is retried up to `Config::retry_count` and never aborts
//! its neighbours.

mod dashboard;

pub use dashboard::{ChainSnapshot, Dashboard};

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::sync::Semaphore;
use vaultscan_cli_runner::CliContext;
use vaultscan_primitives::ChainId;

use crate::{
    batch,
    discovery,
    error::ScanError,
    evm::{EventSource, EvmClient},
    models::{CallStatus, HistoricalRead, VaultReaderState, VaultSpec},
    reader::{self, ReaderStrategy},
    store::Store,
    token_cache::TokenCache,
};

/// How many consecutive reason-less ("gas-pathological-looking") call failures in a row
/// promote that call to a persisted revert, per §4.6's gas-pathology policy. This streak is
/// transient — it lives only for the lifetime of one `read_vault_range` call, not persisted
/// across restarts, since `aggregate3` carries no gas-used metric to reconstruct it from.
const GAS_PATHOLOGY_STREAK: u32 = 3;

/// Emits one decoded [`HistoricalRead`] at a time. The orchestrator doesn't know or care
/// where reads end up (CSV, a channel, a parquet writer downstream) — it only needs a
/// place to hand them off, per §6's "typed stream of `HistoricalRead`" contract.
pub trait ReadSink: Send + Sync {
    fn emit(&self, read: HistoricalRead);
}

impl<F: Fn(HistoricalRead) + Send + Sync> ReadSink for F {
    fn emit(&self, read: HistoricalRead) {
        self(read)
    }
}

/// Everything one chain's worker needs: its own transport, its slice of the shared store
/// and token cache, and the block range to scan/read.
pub struct ChainTask {
    pub chain_id: ChainId,
    pub client: Arc<dyn EvmClient>,
    pub event_source: Arc<dyn EventSource>,
    pub from_block: u64,
    pub to_block: u64,
    /// Block-count stride between successive historical reads, per `reader::block_step`.
    /// Discovery ignores this field; only `read_chain` steps by it.
    pub block_step: u64,
}

pub struct Orchestrator {
    store: Arc<Store>,
    token_cache: Arc<TokenCache>,
    max_getlogs_range: u64,
    per_chain_vault_concurrency: usize,
    retry_count: u32,
    dashboard: Arc<Dashboard>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        token_cache: Arc<TokenCache>,
        max_getlogs_range: u64,
        max_workers: u32,
        retry_count: u32,
    ) -> Self {
        Self {
            store,
            token_cache,
            max_getlogs_range,
            per_chain_vault_concurrency: max_workers.max(1) as usize,
            retry_count,
            dashboard: Arc::new(Dashboard::new()),
        }
    }

    pub fn dashboard(&self) -> Arc<Dashboard> {
        self.dashboard.clone()
    }

    /// Runs discovery then the historical reader for every chain task concurrently.
    /// Chains never block each other: each is its own `tokio::spawn`, so a transport
    /// failure on one chain pauses only that chain's tasks (§4.8). A convenience for
    /// drivers that want the full pipeline in one call; `scan-vaults` and `scan-prices`
    /// call [`Orchestrator::run_discovery`] and [`Orchestrator::run_reads`] separately so
    /// each CLI command does exactly the one phase it names.
    pub async fn run(&self, ctx: CliContext, chains: Vec<ChainTask>, sink: Arc<dyn ReadSink>) {
        self.run_discovery(ctx.clone(), &chains).await;
        self.run_reads(ctx, chains, sink).await;
    }

    /// Runs discovery only, for every chain task concurrently.
    pub async fn run_discovery(&self, ctx: CliContext, chains: &[ChainTask]) {
        let mut handles = Vec::with_capacity(chains.len());
        for chain in chains {
            let store = self.store.clone();
            let token_cache = self.token_cache.clone();
            let dashboard = self.dashboard.clone();
            let ctx = ctx.clone();
            let max_getlogs_range = self.max_getlogs_range;
            let chain_id = chain.chain_id;
            let client = chain.client.clone();
            let event_source = chain.event_source.clone();
            let from_block = chain.from_block;
            let to_block = chain.to_block;

            handles.push(tokio::spawn(async move {
                discover_chain(
                    chain_id, client, event_source, from_block, to_block, ctx, store, token_cache,
                    dashboard, max_getlogs_range,
                )
                .await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Runs the historical reader only, assuming discovery has already persisted the
    /// vaults for every chain task. Every discovered vault's read runs concurrently,
    /// capped at `max_workers` in-flight reads per chain.
    pub async fn run_reads(&self, ctx: CliContext, chains: Vec<ChainTask>, sink: Arc<dyn ReadSink>) {
        let mut handles = Vec::with_capacity(chains.len());
        for chain in chains {
            let store = self.store.clone();
            let dashboard = self.dashboard.clone();
            let sink = sink.clone();
            let ctx = ctx.clone();
            let per_vault_concurrency = self.per_chain_vault_concurrency;
            let retry_count = self.retry_count;

            handles.push(tokio::spawn(async move {
                read_chain(chain, ctx, store, dashboard, sink, per_vault_concurrency, retry_count).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// One chain's discovery pass. Errors are logged and counted on the dashboard, never
/// propagated — a chain that can't reach its RPC endpoint must not bring down the other
/// chains sharing this process.
#[allow(clippy::too_many_arguments)]
async fn discover_chain(
    chain_id: ChainId,
    client: Arc<dyn EvmClient>,
    event_source: Arc<dyn EventSource>,
    from_block: u64,
    to_block: u64,
    ctx: CliContext,
    store: Arc<Store>,
    token_cache: Arc<TokenCache>,
    dashboard: Arc<Dashboard>,
    max_getlogs_range: u64,
) {
    let counters = dashboard.counters_for(chain_id);
    if ctx.is_cancelled() {
        return;
    }

    match discovery::scan(
        event_source.as_ref(),
        client.as_ref(),
        &store,
        &token_cache,
        chain_id,
        from_block,
        to_block,
        max_getlogs_range,
    )
    .await
    {
        Ok(()) => counters.discovery_complete(),
        Err(e) => {
            tracing::warn!(chain_id = %chain_id, error = %e, "discovery failed for this chain");
            counters.record_chain_failure();
        }
    }
}

/// One chain's historical-read pass over whatever vaults discovery has already
/// persisted. Vaults read in parallel, capped at `per_vault_concurrency` in flight.
async fn read_chain(
    chain: ChainTask,
    ctx: CliContext,
    store: Arc<Store>,
    dashboard: Arc<Dashboard>,
    sink: Arc<dyn ReadSink>,
    per_vault_concurrency: usize,
    retry_count: u32,
) {
    let counters = dashboard.counters_for(chain.chain_id);
    if ctx.is_cancelled() {
        return;
    }

    let vaults = match collect_chain_vaults(&store, chain.chain_id) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(chain_id = %chain.chain_id, error = %e, "failed to enumerate discovered vaults");
            counters.record_chain_failure();
            return;
        }
    };
    counters.set_vaults_discovered(vaults.len() as u64);

    let semaphore = Arc::new(Semaphore::new(per_vault_concurrency));
    let mut handles = Vec::with_capacity(vaults.len());
    let blocks = Arc::new(block_range(chain.from_block, chain.to_block, chain.block_step));

    for key in vaults {
        if ctx.is_cancelled() {
            break;
        }
        let semaphore = semaphore.clone();
        let client = chain.client.clone();
        let store = store.clone();
        let sink = sink.clone();
        let counters = counters.clone();
        let ctx = ctx.clone();
        let blocks = blocks.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            match read_vault_range(key, &blocks, client.as_ref(), store.as_ref(), sink.as_ref(), &ctx, retry_count).await {
                Ok(()) => counters.record_vault_read(),
                Err(e) => {
                    tracing::warn!(vault = %key, error = %e, "historical read failed");
                    counters.record_vault_failure();
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

/// Expands `[from, to]` into the block sequence `read_vault_range` walks, `step` apart. Per
/// §4.6's ordering guarantee, this always yields increasing block order; a range narrower
/// than one step still yields its single block rather than nothing.
fn block_range(from: u64, to: u64, step: u64) -> Vec<u64> {
    let step = step.max(1);
    let mut blocks = Vec::new();
    let mut block = from;
    while block <= to {
        blocks.push(block);
        block = match block.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    if blocks.is_empty() {
        blocks.push(to);
    }
    blocks
}

/// Vaults for a chain are whatever discovery just persisted a `VaultReaderState` for.
/// `Store` has no range-scan keyed by chain alone, so this walks every reader state and
/// filters — acceptable at the scale of one chain's discovered-vault set, and the only
/// place that needs such a scan.
fn collect_chain_vaults(store: &Store, chain_id: ChainId) -> Result<Vec<VaultSpec>, ScanError> {
    Ok(store.list_vault_keys()?.into_iter().filter(|key| key.chain_id == chain_id).collect())
}

/// Retries a vault's historical read up to `retry_count` times. Per §4.8, the reader state
/// is left untouched by a failed attempt — only a successful batch's `put_reader_state`
/// commits, so a crash mid-retry never corrupts `call_status`.
#[allow(clippy::too_many_arguments)]
async fn read_vault_with_retry(
    key: VaultSpec,
    to_block: u64,
    client: Arc<dyn EvmClient>,
    store: Arc<Store>,
    sink: Arc<dyn ReadSink>,
    counters: Arc<dashboard::ChainCounters>,
    ctx: CliContext,
    retry_count: u32,
) {
    for attempt in 0..=retry_count {
        if ctx.is_cancelled() {
            return;
        }
        match read_vault_once(key, to_block, client.as_ref(), store.as_ref(), sink.as_ref()).await {
            Ok(()) => {
                counters.record_vault_read();
                return;
            }
            Err(e) => {
                tracing::warn!(vault = %key, attempt, error = %e, "historical read failed");
                if attempt == retry_count {
                    counters.record_vault_failure();
                }
            }
        }
    }
}

/// One vault's warmup (if not already recorded) followed by a single-block real read at
/// `block`. Kept as the single-block unit the existing retry-count tests exercise directly;
/// `read_vault_range` is the multi-block loop `scan-prices` actually drives.
async fn read_vault_once(
    key: VaultSpec,
    block: u64,
    client: &dyn EvmClient,
    store: &Store,
    sink: &dyn ReadSink,
) -> Result<(), ScanError> {
    let mut state = store
        .load_reader_state(&key)?
        .ok_or_else(|| ScanError::Other(eyre::eyre!("no reader state for vault {key}")))?;
    let strategy = reader::strategy_for(&state.features);

    run_warmup(&mut state, &strategy, key, block, client, store).await?;

    let decimals = store.load_token(&key)?.map(|t| t.decimals).unwrap_or(18);
    let mut gas_streaks = BTreeMap::new();
    read_block(key, block, client, store, sink, &mut state, &strategy, decimals, &mut gas_streaks).await
}

/// Backfills a vault across `blocks` (ascending, per §4.6's ordering guarantee), running
/// warmup once against the first block and then one real read per subsequent block. A block
/// that still fails after `retry_count` retries aborts the whole range for this vault — the
/// caller counts that as one vault failure, matching `read_vault_with_retry`'s contract.
async fn read_vault_range(
    key: VaultSpec,
    blocks: &[u64],
    client: &dyn EvmClient,
    store: &Store,
    sink: &dyn ReadSink,
    ctx: &CliContext,
    retry_count: u32,
) -> Result<(), ScanError> {
    let first_block = *blocks
        .first()
        .ok_or_else(|| ScanError::Config("read_vault_range given an empty block sequence".into()))?;

    let mut state = store
        .load_reader_state(&key)?
        .ok_or_else(|| ScanError::Other(eyre::eyre!("no reader state for vault {key}")))?;
    let strategy = reader::strategy_for(&state.features);

    run_warmup(&mut state, &strategy, key, first_block, client, store).await?;

    let decimals = store.load_token(&key)?.map(|t| t.decimals).unwrap_or(18);
    let mut gas_streaks = BTreeMap::new();

    for &block in blocks {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let mut last_err = None;
        for attempt in 0..=retry_count {
            match read_block(key, block, client, store, sink, &mut state, &strategy, decimals, &mut gas_streaks).await {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    tracing::warn!(vault = %key, block, attempt, error = %e, "historical read failed");
                    last_err = Some(e);
                }
            }
        }
        if let Some(e) = last_err {
            return Err(e);
        }
    }
    Ok(())
}

/// Probes every warmup call not already recorded in `state.call_status`, persisting the
/// result before any real read is attempted — idempotent across restarts since a call
/// already present in `call_status` is skipped.
async fn run_warmup(
    state: &mut VaultReaderState,
    strategy: &dyn ReaderStrategy,
    key: VaultSpec,
    block: u64,
    client: &dyn EvmClient,
    store: &Store,
) -> Result<(), ScanError> {
    for call in strategy.get_warmup_calls(key.address.into()) {
        if state.call_status.contains_key(&call.function_label) {
            continue;
        }
        let reverts = match client.call(key.address.into(), call.calldata(), block).await {
            Ok(_) => false,
            Err(ScanError::Revert(_)) => true,
            Err(ScanError::GasPathology { .. }) => true,
            Err(e) => return Err(e),
        };
        state.call_status.insert(call.function_label.clone(), CallStatus { check_block: block, reverts });
    }
    store.put_reader_state(state)
}

/// One block's real read: dispatches the strategy's bundle (pruned of calls already marked
/// `reverts`), decodes it, and emits a `HistoricalRead`. A call whose result keeps coming
/// back reason-less (no decoded revert string — the practical proxy for a gas-exhausted
/// sub-call, since `aggregate3` carries no gas-used figure) for `GAS_PATHOLOGY_STREAK`
/// consecutive blocks in `gas_streaks` is promoted to a persisted `reverts: true`, per
/// §4.6's mid-scan gas-pathology policy.
#[allow(clippy::too_many_arguments)]
async fn read_block(
    key: VaultSpec,
    block: u64,
    client: &dyn EvmClient,
    store: &Store,
    sink: &dyn ReadSink,
    state: &mut VaultReaderState,
    strategy: &dyn ReaderStrategy,
    decimals: u8,
    gas_streaks: &mut BTreeMap<String, u32>,
) -> Result<(), ScanError> {
    let bundle: Vec<_> = strategy
        .build_bundle(key.address.into(), block)
        .into_iter()
        .filter(|call| !state.is_pruned(&call.function_label))
        .collect();

    let results = batch::dispatch(client, &bundle, block).await?;

    let mut by_label = BTreeMap::new();
    for (call, result) in bundle.into_iter().zip(results) {
        if !result.success && result.revert_reason.is_none() {
            let streak = gas_streaks.entry(call.function_label.clone()).or_insert(0);
            *streak += 1;
            if *streak >= GAS_PATHOLOGY_STREAK {
                state
                    .call_status
                    .insert(call.function_label.clone(), CallStatus { check_block: block, reverts: true });
            }
        } else {
            gas_streaks.insert(call.function_label.clone(), 0);
        }
        by_label.insert(call.function_label, result);
    }

    let mut read = strategy.decode_bundle(key, block, decimals, &by_label);
    if let Ok(ts) = client.get_block_timestamp(block).await {
        read.timestamp = Some(ts);
    }

    state.last_scanned_block = Some(block);
    store.put_reader_state(state)?;

    sink.emit(read);
    Ok(())
}

/// A small backoff helper for chain-wide transport pauses, used by callers that wrap
/// [`Orchestrator::run`] in a retry loop across `scan-prices` invocations.
pub async fn pause_before_retry(attempt: u32) {
    let millis = 200u64.saturating_mul(1 << attempt.min(6));
    tokio::time::sleep(Duration::from_millis(millis.min(10_000))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address as AlloyAddress, Bytes, B256};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use vaultscan_primitives::Address;

    struct FailingClient;

    #[async_trait]
    impl EvmClient for FailingClient {
        fn chain_id(&self) -> u32 {
            1
        }
        async fn call(&self, _target: AlloyAddress, _data: Bytes, _block: u64) -> Result<Bytes, ScanError> {
            Err(ScanError::transport("no rpc in this test"))
        }
        async fn multicall_available(&self, _block: u64) -> Result<bool, ScanError> {
            Ok(false)
        }
        async fn get_block_timestamp(&self, _block: u64) -> Result<u64, ScanError> {
            Ok(0)
        }
        async fn latest_block(&self) -> Result<u64, ScanError> {
            Ok(0)
        }
        async fn get_storage_at(&self, _address: AlloyAddress, _slot: B256, _block: u64) -> Result<B256, ScanError> {
            Err(ScanError::transport("no rpc in this test"))
        }
    }

    #[tokio::test]
    async fn a_vault_with_no_reader_state_fails_without_touching_the_store() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("store.redb")).unwrap();
        let key = VaultSpec::new(
            ChainId::from(1u64),
            Address::from(AlloyAddress::repeat_byte(9)),
        );

        let err = read_vault_once(key, 100, &FailingClient, &store, &|_: HistoricalRead| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Other(_)));
        assert!(store.load_reader_state(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_gives_up_after_retry_count_and_counts_one_failure() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("store.redb")).unwrap());
        let key = VaultSpec::new(
            ChainId::from(1u64),
            Address::from(AlloyAddress::repeat_byte(9)),
        );
        let dashboard = Dashboard::new();
        let counters = dashboard.counters_for(key.chain_id);
        let emitted: Arc<Mutex<Vec<HistoricalRead>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_emitted = emitted.clone();
        let sink: Arc<dyn ReadSink> = Arc::new(move |r: HistoricalRead| sink_emitted.lock().unwrap().push(r));

        read_vault_with_retry(
            key,
            100,
            Arc::new(FailingClient),
            store,
            sink,
            counters.clone(),
            CliContext::default(),
            2,
        )
        .await;

        assert_eq!(counters.snapshot().vaults_failed, 1);
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn block_range_steps_from_first_to_last_inclusive() {
        assert_eq!(block_range(100, 130, 10), vec![100, 110, 120, 130]);
        assert_eq!(block_range(100, 100, 10), vec![100]);
        assert_eq!(block_range(100, 105, 10), vec![100]);
    }

    /// A fake whose `aggregate3` calls always come back with empty, reason-less failures —
    /// the signature a gas-exhausted sub-call leaves once decoded (§4.6). Direct (non-batch)
    /// calls, used only during warmup, always succeed so every vault reaches the read loop.
    struct AlwaysGasPathologicalClient;

    #[async_trait]
    impl EvmClient for AlwaysGasPathologicalClient {
        fn chain_id(&self) -> u32 {
            1
        }

        async fn call(&self, _target: AlloyAddress, data: Bytes, _block: u64) -> Result<Bytes, ScanError> {
            use alloy_sol_types::SolCall;
            use vaultscan_multicall::IMulticall3;

            match IMulticall3::aggregate3Call::abi_decode(&data, false) {
                Ok(decoded) => {
                    let results: Vec<_> = decoded
                        .calls
                        .iter()
                        .map(|_| IMulticall3::Result { success: false, returnData: Bytes::new() })
                        .collect();
                    Ok(Bytes::from(IMulticall3::aggregate3Call::abi_encode_returns(&IMulticall3::aggregate3Return {
                        returnData: results,
                    })))
                }
                Err(_) => Ok(Bytes::new()),
            }
        }

        async fn multicall_available(&self, _block: u64) -> Result<bool, ScanError> {
            Ok(true)
        }

        async fn get_block_timestamp(&self, _block: u64) -> Result<u64, ScanError> {
            Ok(0)
        }

        async fn latest_block(&self) -> Result<u64, ScanError> {
            Ok(0)
        }

        async fn get_storage_at(&self, _address: AlloyAddress, _slot: B256, _block: u64) -> Result<B256, ScanError> {
            Err(ScanError::transport("no rpc in this test"))
        }
    }

    #[tokio::test]
    async fn a_call_that_stays_gas_pathological_for_three_blocks_is_promoted_and_pruned() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("store.redb")).unwrap();
        let key = VaultSpec::new(ChainId::from(1u64), Address::from(AlloyAddress::repeat_byte(9)));
        store.put_reader_state(&crate::models::VaultReaderState::new(key, Default::default())).unwrap();

        let client = AlwaysGasPathologicalClient;
        let sink: &dyn ReadSink = &(|_: HistoricalRead| {});

        read_vault_range(key, &[1, 2, 3, 4], &client, &store, sink, &CliContext::default(), 0).await.unwrap();

        let state = store.load_reader_state(&key).unwrap().unwrap();
        assert!(state.is_pruned("totalAssets"));
        assert!(state.is_pruned("totalSupply"));
        assert_eq!(state.call_status.get("totalAssets").unwrap().check_block, 3);
    }
}
