//! Resume semantics across a simulated process restart (scenario S4): the event cursor
//! persisted by one `discovery::scan` call is the exact `from_block` the next call picks up
//! from, after the `Store` is closed and reopened from the same path.

use std::sync::Mutex;

use alloy_primitives::{Address as AlloyAddress, Bytes, B256};
use async_trait::async_trait;
use tempfile::tempdir;
use vaultscan::{
    discovery,
    error::ScanError,
    evm::{EventSource, EvmClient, Log, LogFilter},
    store::Store,
    token_cache::TokenCache,
};
use vaultscan_primitives::ChainId;

/// Every probe call reverts, so leads are never classified — this test only exercises
/// cursor persistence, not classification. Logs are filtered to the requested window so a
/// re-scan starting from the persisted cursor never re-observes a lead from before it.
struct FakeChain {
    logs: Vec<Log>,
    calls_seen: Mutex<usize>,
}

#[async_trait]
impl EvmClient for FakeChain {
    fn chain_id(&self) -> u32 {
        1
    }

    async fn call(&self, _target: AlloyAddress, _data: Bytes, _block: u64) -> Result<Bytes, ScanError> {
        *self.calls_seen.lock().unwrap() += 1;
        Err(ScanError::transport("fake chain has no multicall"))
    }

    // Reports a multicall deployment present so `batch::dispatch` actually drives every
    // probe through `call`, keeping `calls_seen` meaningful for this test's assertion.
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
        Err(ScanError::transport("fake chain has no storage"))
    }
}

#[async_trait]
impl EventSource for FakeChain {
    async fn get_logs(&self, _filter: &LogFilter, from_block: u64, to_block: u64) -> Result<Vec<Log>, ScanError> {
        Ok(self
            .logs
            .iter()
            .filter(|log| log.block_number >= from_block && log.block_number <= to_block)
            .cloned()
            .collect())
    }
}

fn log_at(address: AlloyAddress, block_number: u64) -> Log {
    Log { address, topics: vec![], data: Bytes::new(), block_number, transaction_hash: None }
}

#[tokio::test]
async fn a_second_scan_resumes_from_the_persisted_cursor_after_a_restart() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("store.redb");
    let chain_id = ChainId::from(1u64);

    let lead_a = AlloyAddress::repeat_byte(1);
    let lead_b = AlloyAddress::repeat_byte(2);

    {
        let store = Store::open(&store_path).unwrap();
        let token_cache = TokenCache::new(std::sync::Arc::new(Store::open(&dir.path().join("tokens.redb")).unwrap()));
        let chain = FakeChain { logs: vec![log_at(lead_a, 10)], calls_seen: Mutex::new(0) };

        discovery::scan(&chain, &chain, &store, &token_cache, chain_id, 1, 50, 2_000).await.unwrap();
        assert_eq!(store.load_cursor(chain_id).unwrap(), Some(50));
        assert!(*chain.calls_seen.lock().unwrap() > 0, "lead_a's probe calls should have been attempted");
    }

    // Simulate a process restart: drop every in-memory handle, reopen the same store file.
    let store = Store::open(&store_path).unwrap();
    let token_cache = TokenCache::new(std::sync::Arc::new(Store::open(&dir.path().join("tokens.redb")).unwrap()));

    let resumed_from = store.load_cursor(chain_id).unwrap().expect("cursor survives the restart");
    assert_eq!(resumed_from, 50);

    // A lead sitting before the resumed cursor must never be re-observed: this chain only
    // has `lead_b` in the window the resumed scan actually asks for.
    let chain = FakeChain { logs: vec![log_at(lead_a, 10), log_at(lead_b, 75)], calls_seen: Mutex::new(0) };
    discovery::scan(&chain, &chain, &store, &token_cache, chain_id, resumed_from + 1, 100, 2_000).await.unwrap();

    assert_eq!(store.load_cursor(chain_id).unwrap(), Some(100));

    // Neither lead ever classifies (every probe reverts), so no vault is persisted — this
    // test is only about the cursor, matching the existing discovery-level unit test's
    // treatment of an always-reverting fake chain.
    assert!(store.list_vault_keys().unwrap().is_empty());
}
