use alloy_sol_types::sol;

/// Zero-argument getters used purely as capability probes: a non-reverting call
/// fingerprints the protocol regardless of what it returns. Grouped here rather than
/// alongside each protocol's full interface because the classification registry only
/// ever calls these through their selector, never decodes the return value meaningfully.
sol! {
    #[derive(Debug)]
    #[sol(rpc, abi)]
    interface IProtocolProbes {
        function POOL() external view returns (address);
        function MORPHO() external view returns (address);
        function getTotalPooledEther() external view returns (uint256);
        function apiVersion() external view returns (string);
        function share() external view returns (address);
        function delegator() external view returns (address);
        function parentStrategy() external view returns (address);
        function perpDexRouter() external view returns (address);
    }
}
