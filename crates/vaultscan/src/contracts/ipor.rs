use alloy_sol_types::sol;

/// IPOR's `PlasmaVault` fee getters. Both return the fee manager and the fee expressed in
/// IPOR's native 1e18-scaled percentage (so `1e16` == 1%); the reader strategy converts
/// that to basis points before it lands in a `HistoricalRead`.
sol! {
    #[derive(Debug)]
    #[sol(rpc, abi)]
    interface IIporFeeConfig {
        function getPerformanceFeeData() external view returns (address feeManager, uint256 feeInPercentage);
        function getManagementFeeData() external view returns (address feeManager, uint256 feeInPercentage);
    }
}
