use alloy_sol_types::sol;

/// Gearbox pool extensions on top of the ERC-4626 baseline: the idle/available liquidity
/// and the amount currently lent out, used to derive `utilisation`.
sol! {
    #[derive(Debug)]
    #[sol(rpc, abi)]
    interface IGearboxPool {
        function availableLiquidity() external view returns (uint256);
        function totalBorrowed() external view returns (uint256);
    }
}
