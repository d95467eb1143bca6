//! Token Cache (C3): memoises `(chain, address) → TokenRef` across a run (in-memory) and
//! across runs (disk, via the `Store`). `symbol`/`name` are best-effort; only `decimals`
//! being unreadable is fatal to the token (`TOKEN_UNREADABLE`).

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use alloy_primitives::Address as AlloyAddress;
use vaultscan_primitives::Address;

use crate::{
    batch::{call_from, decode_returns},
    contracts::erc20,
    error::ScanError,
    models::{CallResult, EncodedCall, TokenRef, VaultSpec},
    store::Store,
};

pub struct TokenCache {
    memory: RwLock<HashMap<String, TokenRef>>,
    store: Arc<Store>,
}

impl TokenCache {
    pub fn new(store: Arc<Store>) -> Self {
        Self { memory: RwLock::new(HashMap::new()), store }
    }

    fn key(chain_id: i64, address: &Address) -> String {
        format!("{chain_id}:{}", address.canonical())
    }

    /// Reads the in-memory tier first (the common case once a run has warmed up), then
    /// falls back to the on-disk tier, populating the in-memory tier on a disk hit so a
    /// cache miss only ever touches disk once per token per process.
    pub fn get(&self, vault: &VaultSpec) -> Result<Option<TokenRef>, ScanError> {
        let key = Self::key(vault.chain_id.value(), &vault.address);
        if let Some(token) = self.memory.read().unwrap().get(&key).cloned() {
            return Ok(Some(token));
        }
        if let Some(token) = self.store.load_token(vault)? {
            self.memory.write().unwrap().insert(key, token.clone());
            return Ok(Some(token));
        }
        Ok(None)
    }

    /// Writes through both tiers. The disk write happens first so a crash between the two
    /// never leaves a token that's readable from memory but vanishes on restart.
    pub fn put(&self, vault: &VaultSpec, token: TokenRef) -> Result<(), ScanError> {
        self.store.put_token(vault, &token)?;
        let key = Self::key(vault.chain_id.value(), &vault.address);
        self.memory.write().unwrap().insert(key, token);
        Ok(())
    }

    /// The three metadata probes for one token, tagged `decimals`/`symbol`/`name` for
    /// [`TokenCache::decode`] to demultiplex. Callers batch these through
    /// [`crate::batch::dispatch`] alongside whatever else they're probing at the same block.
    pub fn probe_calls(token: AlloyAddress) -> Vec<EncodedCall> {
        vec![
            call_from(token, "decimals", erc20::decimalsCall {}),
            call_from(token, "symbol", erc20::symbolCall {}),
            call_from(token, "name", erc20::nameCall {}),
        ]
    }

    /// Decodes the three probe results from [`TokenCache::probe_calls`]. Returns
    /// `Err(ScanError::TokenUnreadable)` only when `decimals` failed to decode; a missing
    /// `symbol`/`name` is tolerated and left `None`, per C3's best-effort contract.
    pub fn decode(
        &self,
        vault: &VaultSpec,
        token: AlloyAddress,
        results: &BTreeMap<String, CallResult>,
    ) -> Result<TokenRef, ScanError> {
        let decimals = decode_returns::<erc20::decimalsCall>(results, "decimals").map(|r| r._0);

        let Some(decimals) = decimals else {
            return Err(ScanError::TokenUnreadable {
                chain_id: vault.chain_id.value(),
                address: vault.address.canonical(),
            });
        };

        let symbol = decode_returns::<erc20::symbolCall>(results, "symbol").map(|r| r._0);
        let name = decode_returns::<erc20::nameCall>(results, "name").map(|r| r._0);

        Ok(TokenRef { address: token.into(), symbol, name, decimals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::tempdir;
    use vaultscan_primitives::ChainId;

    fn spec() -> VaultSpec {
        VaultSpec::new(
            ChainId::from(1u64),
            Address::from_str("0x0000000000000000000000000000000000000001").unwrap(),
        )
    }

    #[test]
    fn disk_hits_populate_the_in_memory_tier() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("store.redb")).unwrap());
        let cache = TokenCache::new(store.clone());

        let token = TokenRef {
            address: spec().address,
            symbol: Some("USDC".into()),
            name: Some("USD Coin".into()),
            decimals: 6,
        };
        store.put_token(&spec(), &token).unwrap();

        assert!(cache.memory.read().unwrap().is_empty());
        let fetched = cache.get(&spec()).unwrap().unwrap();
        assert_eq!(fetched.decimals, 6);
        assert!(!cache.memory.read().unwrap().is_empty());
    }

    #[test]
    fn probe_calls_are_tagged_for_demultiplexing() {
        let calls = TokenCache::probe_calls(AlloyAddress::repeat_byte(1));
        let labels: Vec<&str> = calls.iter().map(|c| c.function_label.as_str()).collect();
        assert_eq!(labels, vec!["decimals", "symbol", "name"]);
    }
}
