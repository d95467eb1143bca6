use std::collections::BTreeMap;

use alloy_primitives::{Address as AlloyAddress, U256};

use crate::{
    contracts::erc4626::IErc4626,
    models::{CallResult, EncodedCall, HistoricalRead, VaultSpec},
};

use super::{call_from, decode_returns, ReaderStrategy};

/// One whole share, in 18-decimal fixed point — `convertToAssets`'s usual probe argument,
/// since most vaults round-trip this cleanly regardless of their own share decimals.
fn one_share() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

/// The ERC-4626 read surface every vault gets, regardless of protocol: `totalAssets` and
/// `totalSupply` (from which `share_price` is derived), plus `maxDeposit` — not part of
/// `HistoricalRead` itself, but probed so a vault whose `maxDeposit` is gas-pathological
/// gets it pruned during warmup rather than on the first real read.
pub struct BaselineStrategy;

impl BaselineStrategy {
    fn calls(&self, vault: AlloyAddress) -> Vec<EncodedCall> {
        vec![
            call_from(vault, "asset", IErc4626::assetCall {}),
            call_from(vault, "totalAssets", IErc4626::totalAssetsCall {}),
            call_from(vault, "totalSupply", IErc4626::totalSupplyCall {}),
            call_from(vault, "convertToAssets", IErc4626::convertToAssetsCall { shares: one_share() }),
            call_from(vault, "maxDeposit", IErc4626::maxDepositCall { receiver: AlloyAddress::ZERO }),
        ]
    }
}

impl ReaderStrategy for BaselineStrategy {
    fn name(&self) -> &'static str {
        "erc4626-baseline"
    }

    fn get_warmup_calls(&self, vault: AlloyAddress) -> Vec<EncodedCall> {
        self.calls(vault)
    }

    fn build_bundle(&self, vault: AlloyAddress, _block: u64) -> Vec<EncodedCall> {
        self.calls(vault)
    }

    fn decode_bundle(
        &self,
        key: VaultSpec,
        block: u64,
        decimals: u8,
        results: &BTreeMap<String, CallResult>,
    ) -> HistoricalRead {
        let mut read = HistoricalRead::empty(key, block);

        match decode_returns::<IErc4626::totalAssetsCall>(results, "totalAssets") {
            Some(r) => read.total_assets = Some(vaultscan_primitives::Decimal::from_token_amount(r._0, decimals)),
            None => read.errors.push("totalAssets".to_string()),
        }

        match decode_returns::<IErc4626::totalSupplyCall>(results, "totalSupply") {
            Some(r) => read.total_supply = Some(vaultscan_primitives::Decimal::from_token_amount(r._0, decimals)),
            None => read.errors.push("totalSupply".to_string()),
        }

        read.derive_share_price();
        read
    }
}
