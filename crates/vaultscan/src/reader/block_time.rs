//! Converts a [`Frequency`](crate::config::Frequency) sampling cadence into a per-chain
//! block-count step for `read_range`, per §4.6/§9 Open Question 1. No RPC method reports a
//! chain's average block time, so this is an externalised table rather than a computed
//! value — a chain missing from it is a configuration error, not a guess.

use vaultscan_primitives::ChainId;

use crate::{config::Frequency, error::ScanError};

/// `(chain_id, seconds_per_block)`, for every chain this engine is grounded to read.
const SECONDS_PER_BLOCK: &[(i64, u64)] = &[
    (1, 12),    // Ethereum mainnet
    (10, 2),    // Optimism
    (56, 3),    // BNB Smart Chain
    (137, 2),   // Polygon PoS
    (8453, 2),  // Base
    (42161, 1), // Arbitrum One
];

/// The block-count step between successive `read_range` samples for `chain_id` at
/// `frequency`. Always at least 1, so a chain whose block time exceeds the cadence (an hourly
/// scan on a very slow chain) still steps forward rather than looping on the same block.
pub fn block_step(chain_id: ChainId, frequency: Frequency) -> Result<u64, ScanError> {
    let seconds_per_block = SECONDS_PER_BLOCK
        .iter()
        .find(|(id, _)| *id == chain_id.value())
        .map(|(_, secs)| *secs)
        .ok_or_else(|| ScanError::Config(format!("no block-time entry for chain {chain_id}")))?;

    let cadence_secs = match frequency {
        Frequency::Hourly => 3_600,
        Frequency::Daily => 86_400,
    };

    Ok((cadence_secs / seconds_per_block).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_cadence_on_mainnet_steps_three_hundred_blocks() {
        assert_eq!(block_step(ChainId::from(1u64), Frequency::Hourly).unwrap(), 300);
    }

    #[test]
    fn daily_cadence_on_arbitrum_steps_eighty_six_thousand_four_hundred_blocks() {
        assert_eq!(block_step(ChainId::from(42161u64), Frequency::Daily).unwrap(), 86_400);
    }

    #[test]
    fn an_unlisted_chain_is_a_config_error_not_a_guess() {
        let err = block_step(ChainId::from(999_999u64), Frequency::Hourly).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
