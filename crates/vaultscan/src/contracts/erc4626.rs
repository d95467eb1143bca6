use alloy_sol_types::sol;

/// The baseline ERC-4626 read surface every vault is probed with, regardless of which
/// protocol it turns out to implement.
sol! {
    #[derive(Debug)]
    #[sol(rpc, abi)]
    interface IErc4626 {
        function asset() external view returns (address);
        function totalAssets() external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function convertToShares(uint256 assets) external view returns (uint256);
        function convertToAssets(uint256 shares) external view returns (uint256);
        function maxDeposit(address receiver) external view returns (uint256);
    }
}
