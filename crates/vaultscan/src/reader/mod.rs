//! Historical Reader (C6): per-vault strategies that emit a multicall bundle for a block
//! height and decode it into a `HistoricalRead`.
//!
//! Per the redesign flag in the design notes, strategies are plain values behind a trait
//! rather than a subclass hierarchy: a baseline ERC-4626 strategy and zero or more
//! protocol extensions are concatenated into a [`CompositeStrategy`], not inherited from.

mod baseline;
mod block_time;
mod protocols;

pub use baseline::BaselineStrategy;
pub use block_time::block_step;
pub use protocols::{EulerStrategy, GearboxStrategy, IporStrategy};

use std::collections::BTreeMap;

use alloy_primitives::Address as AlloyAddress;
use vaultscan_primitives::Decimal;

use crate::models::{CallResult, EncodedCall, Feature, FeatureSet, HistoricalRead, VaultSpec};

pub(crate) use crate::batch::{call_from, decode_returns};

/// A pure function `(FeatureSet) -> ReaderStrategy`, implemented as a trait rather than a
/// subclass hierarchy (see module docs).
pub trait ReaderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Calls to probe individually (not multicalled) during warmup.
    fn get_warmup_calls(&self, vault: AlloyAddress) -> Vec<EncodedCall>;

    /// The strategy's full call bundle for a block. The reader orchestration — not the
    /// strategy — is responsible for dropping calls whose `call_status.reverts == true`
    /// before dispatching this through the multicall batcher.
    fn build_bundle(&self, vault: AlloyAddress, block: u64) -> Vec<EncodedCall>;

    /// Decodes whichever of this layer's calls are present in `results` (calls pruned by
    /// the caller simply won't be present) into a partial `HistoricalRead`. `decimals` is
    /// the denomination asset's decimals, needed to scale integer amounts into `Decimal`.
    fn decode_bundle(
        &self,
        key: VaultSpec,
        block: u64,
        decimals: u8,
        results: &BTreeMap<String, CallResult>,
    ) -> HistoricalRead;
}

/// Concatenates a baseline strategy with zero or more protocol extensions.
pub struct CompositeStrategy {
    layers: Vec<Box<dyn ReaderStrategy>>,
}

impl ReaderStrategy for CompositeStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn get_warmup_calls(&self, vault: AlloyAddress) -> Vec<EncodedCall> {
        self.layers.iter().flat_map(|layer| layer.get_warmup_calls(vault)).collect()
    }

    fn build_bundle(&self, vault: AlloyAddress, block: u64) -> Vec<EncodedCall> {
        self.layers.iter().flat_map(|layer| layer.build_bundle(vault, block)).collect()
    }

    fn decode_bundle(
        &self,
        key: VaultSpec,
        block: u64,
        decimals: u8,
        results: &BTreeMap<String, CallResult>,
    ) -> HistoricalRead {
        let mut merged = HistoricalRead::empty(key, block);
        for layer in &self.layers {
            let partial = layer.decode_bundle(key, block, decimals, results);
            merge_field(&mut merged.total_assets, partial.total_assets);
            merge_field(&mut merged.total_supply, partial.total_supply);
            merge_field(&mut merged.management_fee_bps, partial.management_fee_bps);
            merge_field(&mut merged.performance_fee_bps, partial.performance_fee_bps);
            merge_field(&mut merged.available_liquidity, partial.available_liquidity);
            merge_field(&mut merged.utilisation, partial.utilisation);
            merge_field(&mut merged.timestamp, partial.timestamp);
            merged.errors.extend(partial.errors);
        }
        merged.derive_share_price();
        merged
    }
}

fn merge_field<T>(into: &mut Option<T>, from: Option<T>) {
    if into.is_none() {
        *into = from;
    }
}

/// Binds a `FeatureSet` to a `ReaderStrategy`: baseline always applies, protocol
/// extensions are appended per matching feature. Pure and deterministic, per the
/// redesign flag replacing the source's dynamic per-protocol subclass loading.
pub fn strategy_for(features: &FeatureSet) -> CompositeStrategy {
    let mut layers: Vec<Box<dyn ReaderStrategy>> = vec![Box::new(BaselineStrategy)];

    if features.contains(&Feature::IporLike) {
        layers.push(Box::new(IporStrategy));
    }
    if features.contains(&Feature::GearboxLike) {
        layers.push(Box::new(GearboxStrategy));
    }
    if features.contains(&Feature::EulerLike) {
        layers.push(Box::new(EulerStrategy));
    }

    CompositeStrategy { layers }
}

/// Utilisation: `(totalAssets - availableLiquidity) / totalAssets`, the generic
/// lending-vault formula from the glossary. `None` when either operand is missing or
/// `total_assets` is zero (mirrors the share-price invariant: missing, not zero).
pub(crate) fn derive_utilisation(total_assets: Option<Decimal>, available_liquidity: Option<Decimal>) -> Option<Decimal> {
    let assets = total_assets?;
    let liquidity = available_liquidity?;
    if assets.is_zero() {
        return None;
    }
    let lent_out = assets.checked_sub(liquidity)?;
    lent_out.checked_div(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};
    use std::str::FromStr;
    use vaultscan_primitives::{Address, ChainId};

    fn vault_spec() -> VaultSpec {
        VaultSpec::new(
            ChainId::from(1u64),
            Address::from_str("0x0000000000000000000000000000000000000001").unwrap(),
        )
    }

    fn succeed(results: &mut BTreeMap<String, CallResult>, label: &str, data: Bytes) {
        results.insert(label.to_string(), CallResult::ok(data, 100));
    }

    fn uint_bytes(value: u64) -> Bytes {
        Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec())
    }

    #[test]
    fn baseline_decodes_total_assets_and_supply_into_share_price() {
        let strategy = BaselineStrategy;
        let mut results = BTreeMap::new();
        succeed(&mut results, "totalAssets", uint_bytes(200));
        succeed(&mut results, "totalSupply", uint_bytes(100));

        let read = strategy.decode_bundle(vault_spec(), 100, 18, &results);
        assert!(read.total_assets.is_some());
        assert!(read.total_supply.is_some());
    }

    #[test]
    fn composite_merges_fields_from_every_layer_without_overwriting() {
        let strategy = strategy_for(&{
            let mut f = FeatureSet::new();
            f.insert(Feature::GearboxLike);
            f
        });

        let mut results = BTreeMap::new();
        succeed(&mut results, "totalAssets", uint_bytes(1_000));
        succeed(&mut results, "totalSupply", uint_bytes(500));
        succeed(&mut results, "availableLiquidity", uint_bytes(400));

        let read = strategy.decode_bundle(vault_spec(), 100, 18, &results);
        assert!(read.total_assets.is_some());
        assert!(read.available_liquidity.is_some());
        assert!(read.utilisation.is_some());
    }

    #[test]
    fn derive_utilisation_is_none_when_total_assets_is_zero() {
        assert_eq!(derive_utilisation(Some(Decimal::zero()), Some(Decimal::zero())), None);
    }
}
