use alloy_sol_types::sol;

/// Euler's vault-level liquidity accessors, analogous to Gearbox's but named after
/// Euler's own eToken nomenclature.
sol! {
    #[derive(Debug)]
    #[sol(rpc, abi)]
    interface IEulerVault {
        function cash() external view returns (uint256);
        function totalBorrows() external view returns (uint256);
    }
}
