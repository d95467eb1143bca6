use std::collections::BTreeMap;

use alloy_primitives::{Address as AlloyAddress, U256};
use vaultscan_primitives::Decimal;

use crate::{
    contracts::{erc4626::IErc4626, euler::IEulerVault, gearbox::IGearboxPool, ipor::IIporFeeConfig},
    models::{CallResult, EncodedCall, HistoricalRead, VaultSpec},
};

use super::{call_from, decode_returns, derive_utilisation, ReaderStrategy};

/// IPOR's fee getters report a percentage scaled to 1e18 (`1e16` == 1%); this reader
/// converts that into basis points. Values above 10000bps are clamped rather than
/// silently wrapped — a fee getter that returns garbage shouldn't corrupt the record.
fn percentage_1e18_to_bps(value: U256) -> u32 {
    let bps = value / U256::from(100_000_000_000_000u64);
    let capped = bps.min(U256::from(10_000u64));
    capped.to::<u32>()
}

/// IPOR `PlasmaVault` fee extension: management and performance fees, converted to bps.
pub struct IporStrategy;

impl ReaderStrategy for IporStrategy {
    fn name(&self) -> &'static str {
        "ipor"
    }

    fn get_warmup_calls(&self, vault: AlloyAddress) -> Vec<EncodedCall> {
        self.build_bundle(vault, 0)
    }

    fn build_bundle(&self, vault: AlloyAddress, _block: u64) -> Vec<EncodedCall> {
        vec![
            call_from(vault, "getPerformanceFeeData", IIporFeeConfig::getPerformanceFeeDataCall {}),
            call_from(vault, "getManagementFeeData", IIporFeeConfig::getManagementFeeDataCall {}),
        ]
    }

    fn decode_bundle(
        &self,
        key: VaultSpec,
        block: u64,
        _decimals: u8,
        results: &BTreeMap<String, CallResult>,
    ) -> HistoricalRead {
        let mut read = HistoricalRead::empty(key, block);

        match decode_returns::<IIporFeeConfig::getPerformanceFeeDataCall>(results, "getPerformanceFeeData") {
            Some(r) => read.performance_fee_bps = Some(percentage_1e18_to_bps(r.feeInPercentage)),
            None => read.errors.push("getPerformanceFeeData".to_string()),
        }

        match decode_returns::<IIporFeeConfig::getManagementFeeDataCall>(results, "getManagementFeeData") {
            Some(r) => read.management_fee_bps = Some(percentage_1e18_to_bps(r.feeInPercentage)),
            None => read.errors.push("getManagementFeeData".to_string()),
        }

        read
    }
}

/// Gearbox pool extension: available liquidity, from which `utilisation` is derived
/// against the baseline's `totalAssets`.
pub struct GearboxStrategy;

impl ReaderStrategy for GearboxStrategy {
    fn name(&self) -> &'static str {
        "gearbox"
    }

    fn get_warmup_calls(&self, vault: AlloyAddress) -> Vec<EncodedCall> {
        self.build_bundle(vault, 0)
    }

    fn build_bundle(&self, vault: AlloyAddress, _block: u64) -> Vec<EncodedCall> {
        vec![call_from(vault, "availableLiquidity", IGearboxPool::availableLiquidityCall {})]
    }

    fn decode_bundle(
        &self,
        key: VaultSpec,
        block: u64,
        decimals: u8,
        results: &BTreeMap<String, CallResult>,
    ) -> HistoricalRead {
        let mut read = HistoricalRead::empty(key, block);

        let liquidity = match decode_returns::<IGearboxPool::availableLiquidityCall>(results, "availableLiquidity") {
            Some(r) => {
                let value = Decimal::from_token_amount(r._0, decimals);
                read.available_liquidity = Some(value);
                Some(value)
            }
            None => {
                read.errors.push("availableLiquidity".to_string());
                None
            }
        };

        let total_assets = decode_returns::<IErc4626::totalAssetsCall>(results, "totalAssets")
            .map(|r| Decimal::from_token_amount(r._0, decimals));

        read.utilisation = derive_utilisation(total_assets, liquidity);
        read
    }
}

/// Euler vault extension: `cash` is Euler's name for idle liquidity, read the same way
/// Gearbox's `availableLiquidity` is.
pub struct EulerStrategy;

impl ReaderStrategy for EulerStrategy {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn get_warmup_calls(&self, vault: AlloyAddress) -> Vec<EncodedCall> {
        self.build_bundle(vault, 0)
    }

    fn build_bundle(&self, vault: AlloyAddress, _block: u64) -> Vec<EncodedCall> {
        vec![call_from(vault, "cash", IEulerVault::cashCall {})]
    }

    fn decode_bundle(
        &self,
        key: VaultSpec,
        block: u64,
        decimals: u8,
        results: &BTreeMap<String, CallResult>,
    ) -> HistoricalRead {
        let mut read = HistoricalRead::empty(key, block);

        let liquidity = match decode_returns::<IEulerVault::cashCall>(results, "cash") {
            Some(r) => {
                let value = Decimal::from_token_amount(r._0, decimals);
                read.available_liquidity = Some(value);
                Some(value)
            }
            None => {
                read.errors.push("cash".to_string());
                None
            }
        };

        let total_assets = decode_returns::<IErc4626::totalAssetsCall>(results, "totalAssets")
            .map(|r| Decimal::from_token_amount(r._0, decimals));

        read.utilisation = derive_utilisation(total_assets, liquidity);
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_percent_in_ipor_scale_converts_to_one_hundred_bps() {
        let one_percent = U256::from(10u64).pow(U256::from(16u64));
        assert_eq!(percentage_1e18_to_bps(one_percent), 100);
    }

    #[test]
    fn garbage_fee_values_clamp_instead_of_wrapping() {
        assert_eq!(percentage_1e18_to_bps(U256::MAX), 10_000);
    }
}
