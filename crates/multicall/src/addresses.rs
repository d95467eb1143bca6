use alloy_primitives::{address, Address};

/// The canonical Multicall3 deployment address.
///
/// Multicall3 (<https://github.com/mds1/multicall>) was deployed at this address via a
/// keyless deterministic deployment transaction, so it lands on the same address on every
/// EVM chain that has seen the deployment, including every chain this engine targets.
pub const MULTICALL3_ADDRESS: Address = address!("ca11bde05977b3631167028862be2a173976ca11");

/// Resolves the Multicall3 address to use for a given chain.
///
/// Every chain currently in scope uses the canonical deployment; this is kept as a
/// function rather than a bare constant so a chain-specific override can be added later
/// without touching call sites.
pub fn multicall3_address(_chain_id: u64) -> Address {
    MULTICALL3_ADDRESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_to_the_canonical_deployment_for_any_chain() {
        assert_eq!(multicall3_address(1), MULTICALL3_ADDRESS);
        assert_eq!(multicall3_address(42161), MULTICALL3_ADDRESS);
    }
}
