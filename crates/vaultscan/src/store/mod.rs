//! Reader-State Store (C7): durable, crash-safe persistence keyed by `(chain_id, address)`,
//! backed by `redb` — an embedded key/value store that gives us atomic per-key replacement
//! and safe recovery after a crash without hand-rolling a WAL, matching the contract in §4.7.
//! (grounded on `lambdaclass-ethrex`'s use of `redb` for its own state database; the teacher
//! repo has no persistence layer of its own to build from here.)

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use vaultscan_primitives::ChainId;

use crate::{
    error::ScanError,
    models::{CapabilitySet, TokenRef, VaultRecord, VaultReaderState, VaultSpec},
};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("vault_records");
const READER_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("reader_states");
const REJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("rejects");
const TOKEN_CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("token_cache");
const CURSORS: TableDefinition<&str, u64> = TableDefinition::new("cursors");

/// A row surfaced by `list_broken_calls`: one function known to revert or be
/// gas-pathological for one vault, as of the block it was last checked.
#[derive(Debug, Clone)]
pub struct BrokenCall {
    pub chain_id: i64,
    pub address: String,
    pub function_label: String,
    pub check_block: u64,
}

/// The durable store backing C7 (reader state), the token cache (C3) and the discovery
/// rejects snapshot. One `redb::Database` file holds all four tables: they're logically
/// separate contracts but share a crash-recovery boundary, so there is no benefit to
/// splitting them across files.
pub struct Store {
    db: Database,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScanError::Other(eyre::eyre!("failed to create store dir: {e}")))?;
        }
        let db = Database::create(path)
            .map_err(|e| ScanError::Other(eyre::eyre!("failed to open store at {path:?}: {e}")))?;

        // Touch every table on open so a fresh database file always has a consistent
        // schema, rather than deferring table creation to the first write.
        let txn = db
            .begin_write()
            .map_err(|e| ScanError::Other(eyre::eyre!("failed to begin write txn: {e}")))?;
        {
            txn.open_table(RECORDS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            txn.open_table(REJECTS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            txn.open_table(TOKEN_CACHE).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            txn.open_table(CURSORS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;

        Ok(Self { db })
    }

    pub fn put_record(&self, record: &VaultRecord) -> Result<(), ScanError> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| ScanError::Other(eyre::eyre!("failed to encode vault record: {e}")))?;
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            table
                .insert(record.key.store_key().as_str(), bytes.as_slice())
                .map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }

    pub fn load_record(&self, key: &VaultSpec) -> Result<Option<VaultRecord>, ScanError> {
        let txn = self.db.begin_read().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let table = txn.open_table(RECORDS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        match table.get(key.store_key().as_str()).map_err(|e| ScanError::Other(eyre::eyre!(e)))? {
            Some(value) => {
                let record = serde_json::from_slice(value.value())
                    .map_err(|e| ScanError::Other(eyre::eyre!("corrupt vault record: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Atomic per-key replace, per the C7 contract.
    pub fn put_reader_state(&self, state: &VaultReaderState) -> Result<(), ScanError> {
        let bytes = serde_json::to_vec(state)
            .map_err(|e| ScanError::Other(eyre::eyre!("failed to encode reader state: {e}")))?;
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table =
                txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            table
                .insert(state.key.store_key().as_str(), bytes.as_slice())
                .map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }

    /// Amortised multi-row write: one write transaction for the whole batch rather than
    /// one per state, per C7's `batch_put`.
    pub fn batch_put_reader_states(&self, states: &[VaultReaderState]) -> Result<(), ScanError> {
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table =
                txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            for state in states {
                let bytes = serde_json::to_vec(state)
                    .map_err(|e| ScanError::Other(eyre::eyre!("failed to encode reader state: {e}")))?;
                table
                    .insert(state.key.store_key().as_str(), bytes.as_slice())
                    .map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            }
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }

    pub fn load_reader_state(&self, key: &VaultSpec) -> Result<Option<VaultReaderState>, ScanError> {
        let txn = self.db.begin_read().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let table = txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        match table.get(key.store_key().as_str()).map_err(|e| ScanError::Other(eyre::eyre!(e)))? {
            Some(value) => {
                let state = serde_json::from_slice(value.value())
                    .map_err(|e| ScanError::Other(eyre::eyre!("corrupt reader state: {e}")))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub fn put_rejected(&self, key: &VaultSpec, capabilities: &CapabilitySet) -> Result<(), ScanError> {
        let snapshot: Vec<(String, bool)> =
            capabilities.iter().map(|(label, result)| (label.clone(), result.success)).collect();
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| ScanError::Other(eyre::eyre!("failed to encode rejects snapshot: {e}")))?;
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table = txn.open_table(REJECTS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            table
                .insert(key.store_key().as_str(), bytes.as_slice())
                .map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }

    pub fn load_token(&self, key: &VaultSpec) -> Result<Option<TokenRef>, ScanError> {
        let txn = self.db.begin_read().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let table = txn.open_table(TOKEN_CACHE).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        match table.get(key.store_key().as_str()).map_err(|e| ScanError::Other(eyre::eyre!(e)))? {
            Some(value) => {
                let token = serde_json::from_slice(value.value())
                    .map_err(|e| ScanError::Other(eyre::eyre!("corrupt token cache entry: {e}")))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    pub fn put_token(&self, key: &VaultSpec, token: &TokenRef) -> Result<(), ScanError> {
        let bytes = serde_json::to_vec(token)
            .map_err(|e| ScanError::Other(eyre::eyre!("failed to encode token ref: {e}")))?;
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table = txn.open_table(TOKEN_CACHE).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            table
                .insert(key.store_key().as_str(), bytes.as_slice())
                .map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }

    pub fn load_cursor(&self, chain_id: ChainId) -> Result<Option<u64>, ScanError> {
        let txn = self.db.begin_read().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let table = txn.open_table(CURSORS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let key = chain_id.to_string();
        Ok(table.get(key.as_str()).map_err(|e| ScanError::Other(eyre::eyre!(e)))?.map(|v| v.value()))
    }

    /// Advances the cursor in the same write transaction a caller also uses to flush
    /// reader states/records, so a crash can never leave the cursor ahead of the writes
    /// it was meant to follow. Exposed as a plain setter; discovery is responsible for
    /// calling it only after its lead queue has fully drained (§4.5).
    pub fn put_cursor(&self, chain_id: ChainId, block: u64) -> Result<(), ScanError> {
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table = txn.open_table(CURSORS).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            table
                .insert(chain_id.to_string().as_str(), block)
                .map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }

    /// Every vault with persisted reader state, regardless of chain. The orchestrator
    /// filters this by `chain_id` to find the vaults a chain's discovery run just
    /// produced — there's no secondary chain-keyed index, so this is a full scan, fine at
    /// the scale of one chain's discovered-vault set.
    pub fn list_vault_keys(&self) -> Result<Vec<VaultSpec>, ScanError> {
        let txn = self.db.begin_read().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let table = txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;

        let mut keys = Vec::new();
        for entry in table.iter().map_err(|e| ScanError::Other(eyre::eyre!(e)))? {
            let (_, value) = entry.map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            let state: VaultReaderState = serde_json::from_slice(value.value())
                .map_err(|e| ScanError::Other(eyre::eyre!("corrupt reader state: {e}")))?;
            keys.push(state.key);
        }
        Ok(keys)
    }

    /// Diagnostics: every function known to revert or be gas-pathological, across every
    /// vault with persisted reader state. Backs the `check-reader-states` CLI command.
    pub fn list_broken_calls(&self) -> Result<Vec<BrokenCall>, ScanError> {
        let txn = self.db.begin_read().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        let table = txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;

        let mut broken = Vec::new();
        for entry in table.iter().map_err(|e| ScanError::Other(eyre::eyre!(e)))? {
            let (_, value) = entry.map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            let state: VaultReaderState = serde_json::from_slice(value.value())
                .map_err(|e| ScanError::Other(eyre::eyre!("corrupt reader state: {e}")))?;
            for (label, status) in &state.call_status {
                if status.reverts {
                    broken.push(BrokenCall {
                        chain_id: state.key.chain_id.value(),
                        address: state.key.address.canonical(),
                        function_label: label.clone(),
                        check_block: status.check_block,
                    });
                }
            }
        }
        Ok(broken)
    }

    /// Deletes persisted reader state for a single vault, used by `purge-price-data` to
    /// force a clean re-read without discarding the vault's classification.
    pub fn purge_reader_state(&self, key: &VaultSpec) -> Result<(), ScanError> {
        let txn = self.db.begin_write().map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        {
            let mut table =
                txn.open_table(READER_STATES).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
            table.remove(key.store_key().as_str()).map_err(|e| ScanError::Other(eyre::eyre!(e)))?;
        }
        txn.commit().map_err(|e| ScanError::Other(eyre::eyre!(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallStatus, FeatureSet};
    use std::str::FromStr;
    use tempfile::tempdir;
    use vaultscan_primitives::Address;

    fn spec() -> VaultSpec {
        VaultSpec::new(
            ChainId::from(1u64),
            Address::from_str("0x0000000000000000000000000000000000000001").unwrap(),
        )
    }

    #[test]
    fn reader_state_round_trips_through_a_crash_safe_write() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("store.redb")).unwrap();

        let mut state = VaultReaderState::new(spec(), FeatureSet::new());
        state.call_status.insert("maxDeposit".into(), CallStatus { check_block: 10, reverts: true });
        store.put_reader_state(&state).unwrap();

        let loaded = store.load_reader_state(&spec()).unwrap().unwrap();
        assert_eq!(loaded.call_status.get("maxDeposit").unwrap().check_block, 10);
    }

    #[test]
    fn list_broken_calls_surfaces_only_reverting_functions() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("store.redb")).unwrap();

        let mut state = VaultReaderState::new(spec(), FeatureSet::new());
        state.call_status.insert("maxDeposit".into(), CallStatus { check_block: 10, reverts: true });
        state.call_status.insert("totalAssets".into(), CallStatus { check_block: 10, reverts: false });
        store.put_reader_state(&state).unwrap();

        let broken = store.list_broken_calls().unwrap();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].function_label, "maxDeposit");
    }

    #[test]
    fn cursor_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = Store::open(&path).unwrap();
            store.put_cursor(ChainId::from(1u64), 12_345).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.load_cursor(ChainId::from(1u64)).unwrap(), Some(12_345));
    }
}
