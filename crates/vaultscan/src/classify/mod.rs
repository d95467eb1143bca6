//! Vault Classification Registry (C4): reduces a `CapabilitySet` to a `FeatureSet` and a
//! protocol label, per the reduction rules in §4.4.

pub mod registry;

use vaultscan_primitives::{Address, ChainId};

use crate::{
    error::ScanError,
    models::{CapabilitySet, Feature, FeatureSet},
};
use registry::{hardcoded_registry, BASELINE_PROBES, REGISTRY};

/// Result of reducing one vault's capability set.
pub enum ClassifyOutcome {
    Classified(FeatureSet),
    /// No protocol feature matched and the ERC-4626 baseline probes didn't all succeed
    /// either (C4 rule 5) — the capability set is snapshotted to rejects, not persisted
    /// as a `VaultRecord`.
    Rejected,
}

fn probe_succeeded(capabilities: &CapabilitySet, label: &str) -> bool {
    capabilities.get(label).map(|r| r.success).unwrap_or(false)
}

fn row_matches(capabilities: &CapabilitySet, probes: &[&str]) -> bool {
    !probes.is_empty() && probes.iter().all(|label| probe_succeeded(capabilities, label))
}

/// Applies the reduction rules in fixed order. Returns `Err(ScanError::ClassificationConflict)`
/// when two non-additive rows both match — the caller stops processing that vault and
/// stores its capability set in rejects, per the edge case in §4.4.
pub fn classify(
    chain_id: ChainId,
    address: Address,
    capabilities: &CapabilitySet,
) -> Result<ClassifyOutcome, ScanError> {
    // Rule 1: hardcoded single-instance registry short-circuits everything else.
    if let Some(feature) = hardcoded_registry().get(&(chain_id, address)) {
        let mut features = FeatureSet::new();
        features.insert(*feature);
        features.insert(Feature::HardcodedProtocol);
        return Ok(ClassifyOutcome::Classified(features));
    }

    // Rule 2/3: evaluate every row; additive rows are collected unconditionally, but
    // non-additive matches compete for the single protocol slot.
    let mut protocol_matches = Vec::new();
    let mut additive_matches = Vec::new();

    for row in REGISTRY.iter() {
        if row_matches(capabilities, row.probes) {
            if row.additive {
                additive_matches.push(row.feature);
            } else {
                protocol_matches.push(row.feature);
            }
        }
    }

    if protocol_matches.len() > 1 {
        let detail = protocol_matches
            .iter()
            .map(|f| f.protocol_name())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ScanError::ClassificationConflict {
            chain_id: chain_id.value(),
            address: address.canonical(),
            detail: format!("competing protocol features matched: {detail}"),
        });
    }

    let mut features = FeatureSet::new();
    features.extend(additive_matches);

    if let Some(protocol) = protocol_matches.into_iter().next() {
        features.insert(protocol);
        return Ok(ClassifyOutcome::Classified(features));
    }

    // Rule 4: fall back to the ERC-4626 baseline if every baseline probe succeeded.
    if row_matches(capabilities, BASELINE_PROBES) {
        features.insert(Feature::Erc4626Baseline);
        return Ok(ClassifyOutcome::Classified(features));
    }

    // Rule 5: nothing matched, the vault is rejected.
    if features.is_empty() {
        Ok(ClassifyOutcome::Rejected)
    } else {
        // Only additive tags matched with no protocol identity underneath them; still a
        // rejection per rule 5 since there's nothing to attach the additive tags to.
        Ok(ClassifyOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallResult;
    use alloy_primitives::Bytes;
    use std::str::FromStr;

    fn succeed(capabilities: &mut CapabilitySet, label: &str) {
        capabilities.insert(label.to_string(), CallResult::ok(Bytes::new(), 1));
    }

    fn addr(n: u8) -> Address {
        Address::from_str(&format!("0x{:040x}", n)).unwrap()
    }

    #[test]
    fn s1_baseline_only_yields_erc4626_baseline() {
        let mut capabilities = CapabilitySet::new();
        for label in BASELINE_PROBES {
            succeed(&mut capabilities, label);
        }

        match classify(ChainId::from(1u64), addr(1), &capabilities).unwrap() {
            ClassifyOutcome::Classified(features) => {
                assert!(features.contains(&Feature::Erc4626Baseline));
                assert_eq!(features.len(), 1);
            }
            ClassifyOutcome::Rejected => panic!("expected classification"),
        }
    }

    #[test]
    fn s2_ipor_probes_add_ipor_like_alongside_baseline() {
        let mut capabilities = CapabilitySet::new();
        for label in BASELINE_PROBES {
            succeed(&mut capabilities, label);
        }
        succeed(&mut capabilities, "getPerformanceFeeData");
        succeed(&mut capabilities, "getManagementFeeData");

        match classify(ChainId::from(1u64), addr(2), &capabilities).unwrap() {
            ClassifyOutcome::Classified(features) => assert!(features.contains(&Feature::IporLike)),
            ClassifyOutcome::Rejected => panic!("expected classification"),
        }
    }

    #[test]
    fn nothing_matching_is_rejected() {
        let capabilities = CapabilitySet::new();
        match classify(ChainId::from(1u64), addr(3), &capabilities).unwrap() {
            ClassifyOutcome::Rejected => {}
            ClassifyOutcome::Classified(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let mut capabilities = CapabilitySet::new();
        for label in BASELINE_PROBES {
            succeed(&mut capabilities, label);
        }

        let first = classify(ChainId::from(1u64), addr(4), &capabilities).unwrap();
        let second = classify(ChainId::from(1u64), addr(4), &capabilities).unwrap();
        match (first, second) {
            (ClassifyOutcome::Classified(a), ClassifyOutcome::Classified(b)) => assert_eq!(a, b),
            _ => panic!("expected both classifications to agree"),
        }
    }

    #[test]
    fn s5_two_competing_protocol_rows_surface_a_conflict() {
        let mut capabilities = CapabilitySet::new();
        succeed(&mut capabilities, "getPerformanceFeeData");
        succeed(&mut capabilities, "getManagementFeeData");
        succeed(&mut capabilities, "availableLiquidity");
        succeed(&mut capabilities, "totalBorrowed");

        let err = classify(ChainId::from(1u64), addr(5), &capabilities).unwrap_err();
        assert!(matches!(err, ScanError::ClassificationConflict { .. }));
    }
}
