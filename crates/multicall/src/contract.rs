use alloy_sol_types::sol;

sol! {
    /// Minimal Multicall3 interface: only `aggregate3`, the per-call-opt-in-failure
    /// variant used throughout this crate (batched reads must tolerate individual
    /// reverts without failing the whole batch).
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) public payable returns (Result[] memory returnData);
    }
}
