//! The static, version-stamped probe table and hardcoded single-instance registry (C4).

use std::collections::HashMap;

use alloy_primitives::{keccak256, B256};
use vaultscan_primitives::{Address, ChainId};

use crate::models::{Feature, FeatureSet};

/// Event signatures correlated with vault deployment/activity, used by discovery to seed
/// its `get_logs` filter (§4.5 step 1). Kept alongside the probe table since both are part
/// of the same version-stamped registry and change together when a new protocol is added.
pub const EVENT_SIGNATURES: &[&str] = &[
    "Deposit(address,address,uint256,uint256)",
    "Transfer(address,address,uint256)",
];

pub fn event_topics() -> Vec<B256> {
    EVENT_SIGNATURES.iter().map(|sig| keccak256(sig.as_bytes())).collect()
}

/// One row of the probe table: a `Feature` is assigned when every listed probe's
/// `function_label` succeeded in the vault's `CapabilitySet`. Additive rows may co-exist
/// with a protocol feature; non-additive rows compete for the single protocol slot.
pub struct ProbeRow {
    pub feature: Feature,
    pub probes: &'static [&'static str],
    pub additive: bool,
    /// Whether a classified vault carrying this row's feature should have its EIP-1967
    /// proxy implementation slot resolved and recorded (§9 Open Question). Set for
    /// protocols this registry has only ever seen deployed behind an upgradeable proxy;
    /// left off elsewhere since the read is an extra storage call per classified vault.
    pub resolve_proxy: bool,
}

/// Version stamp for the probe table; bumped whenever a row is added or a probe
/// signature changes, so a `RESET_LEADS` rescan can be triggered deliberately rather than
/// guessed from a registry diff.
pub const REGISTRY_VERSION: u32 = 1;

/// Function labels that, all succeeding together, constitute the ERC-4626 baseline (C4
/// rule 4). Not itself a `ProbeRow` because it's a fallback, not a competing protocol row.
pub const BASELINE_PROBES: &[&str] = &["asset", "totalAssets", "convertToShares", "convertToAssets"];

lazy_static::lazy_static! {
    pub static ref REGISTRY: Vec<ProbeRow> = vec![
        ProbeRow { feature: Feature::IporLike, probes: &["getPerformanceFeeData", "getManagementFeeData"], additive: false, resolve_proxy: false },
        ProbeRow { feature: Feature::GearboxLike, probes: &["availableLiquidity", "totalBorrowed"], additive: false, resolve_proxy: false },
        ProbeRow { feature: Feature::EulerLike, probes: &["cash", "totalBorrows"], additive: false, resolve_proxy: false },
        // Aave v3 pools are deployed behind a TransparentUpgradeableProxy on every deployment
        // this registry has seen; recording the implementation slot lets triage tell a
        // routine Aave governance upgrade apart from a vault that just started reverting.
        ProbeRow { feature: Feature::AaveV3Like, probes: &["POOL"], additive: false, resolve_proxy: true },
        ProbeRow { feature: Feature::MorphoBlueLike, probes: &["MORPHO"], additive: false, resolve_proxy: false },
        ProbeRow { feature: Feature::LidoLike, probes: &["getTotalPooledEther"], additive: false, resolve_proxy: false },
        ProbeRow { feature: Feature::YearnV3Like, probes: &["apiVersion"], additive: false, resolve_proxy: false },
        ProbeRow { feature: Feature::Erc7540Like, probes: &["share"], additive: false, resolve_proxy: false },
        ProbeRow { feature: Feature::SymbioticLike, probes: &["delegator"], additive: false, resolve_proxy: false },

        // Additive tags: orthogonal properties a vault of any protocol can carry.
        ProbeRow { feature: Feature::Subvault, probes: &["parentStrategy"], additive: true, resolve_proxy: false },
        ProbeRow { feature: Feature::PerpDexTradingVault, probes: &["perpDexRouter"], additive: true, resolve_proxy: false },
    ];
}

/// True if any feature in `features` has its registry row marked `resolve_proxy`. Discovery
/// calls this after a successful classification to decide whether the extra EIP-1967
/// implementation-slot read is worth making for this vault.
pub fn resolve_proxy_for(features: &FeatureSet) -> bool {
    REGISTRY.iter().any(|row| row.resolve_proxy && features.contains(&row.feature))
}

#[cfg(test)]
mod resolve_proxy_tests {
    use super::*;

    #[test]
    fn a_feature_set_with_no_proxy_resolving_row_is_false() {
        let mut features = FeatureSet::new();
        features.insert(Feature::GearboxLike);
        assert!(!resolve_proxy_for(&features));
    }

    #[test]
    fn a_feature_set_carrying_a_proxy_resolving_row_is_true() {
        let mut features = FeatureSet::new();
        features.insert(Feature::AaveV3Like);
        assert!(resolve_proxy_for(&features));
    }
}

/// Single-instance protocols for which probing is uneconomic (a one-off deployment with
/// no reusable fingerprint) — assigned by address lookup rather than capability probing,
/// per C4 rule 1.
pub fn hardcoded_registry() -> &'static HashMap<(ChainId, Address), Feature> {
    lazy_static::lazy_static! {
        static ref MAP: HashMap<(ChainId, Address), Feature> = HashMap::new();
    }
    &MAP
}

/// Every distinct probe label referenced anywhere in the registry, plus the baseline —
/// the full set discovery must evaluate against a lead before `classify` can run.
pub fn all_probe_labels() -> Vec<&'static str> {
    let mut labels: Vec<&'static str> = BASELINE_PROBES.to_vec();
    for row in REGISTRY.iter() {
        for probe in row.probes {
            if !labels.contains(probe) {
                labels.push(probe);
            }
        }
    }
    labels
}

/// Builds the `EncodedCall` for one registry probe label, or `None` if the label has no
/// known ABI (should not happen for any label actually present in the registry — this is
/// the single place a new row's probe must also be wired up).
pub fn build_probe_call(address: alloy_primitives::Address, label: &str) -> Option<crate::models::EncodedCall> {
    use crate::{
        batch::call_from,
        contracts::{erc4626::IErc4626, euler::IEulerVault, gearbox::IGearboxPool, ipor::IIporFeeConfig, probes::IProtocolProbes},
    };
    use alloy_primitives::U256;

    let one_unit = U256::from(1_000_000_000_000_000_000u64);

    Some(match label {
        "asset" => call_from(address, label, IErc4626::assetCall {}),
        "totalAssets" => call_from(address, label, IErc4626::totalAssetsCall {}),
        "convertToShares" => call_from(address, label, IErc4626::convertToSharesCall { assets: one_unit }),
        "convertToAssets" => call_from(address, label, IErc4626::convertToAssetsCall { shares: one_unit }),
        "getPerformanceFeeData" => call_from(address, label, IIporFeeConfig::getPerformanceFeeDataCall {}),
        "getManagementFeeData" => call_from(address, label, IIporFeeConfig::getManagementFeeDataCall {}),
        "availableLiquidity" => call_from(address, label, IGearboxPool::availableLiquidityCall {}),
        "totalBorrowed" => call_from(address, label, IGearboxPool::totalBorrowedCall {}),
        "cash" => call_from(address, label, IEulerVault::cashCall {}),
        "totalBorrows" => call_from(address, label, IEulerVault::totalBorrowsCall {}),
        "POOL" => call_from(address, label, IProtocolProbes::POOLCall {}),
        "MORPHO" => call_from(address, label, IProtocolProbes::MORPHOCall {}),
        "getTotalPooledEther" => call_from(address, label, IProtocolProbes::getTotalPooledEtherCall {}),
        "apiVersion" => call_from(address, label, IProtocolProbes::apiVersionCall {}),
        "share" => call_from(address, label, IProtocolProbes::shareCall {}),
        "delegator" => call_from(address, label, IProtocolProbes::delegatorCall {}),
        "parentStrategy" => call_from(address, label, IProtocolProbes::parentStrategyCall {}),
        "perpDexRouter" => call_from(address, label, IProtocolProbes::perpDexRouterCall {}),
        _ => return None,
    })
}

#[cfg(test)]
mod registry_probe_tests {
    use super::*;

    #[test]
    fn every_registry_label_has_a_known_probe_call() {
        for label in all_probe_labels() {
            assert!(
                build_probe_call(alloy_primitives::Address::ZERO, label).is_some(),
                "registry label {label} has no matching probe call"
            );
        }
    }
}
