use alloy_contract::Error as ContractError;
use alloy_transport::TransportError;

/// Errors produced while building, sending or decoding a multicall batch.
///
/// This deliberately stays separate from the engine-level `ScanError` taxonomy: a
/// `Multicall` is a reusable building block, not aware of vault classification or
/// persistence, so it only needs to describe failures at the RPC/ABI boundary.
#[derive(Debug, thiserror::Error)]
pub enum MulticallError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("failed to encode call arguments for {selector}: {source}")]
    Encode { selector: String, source: alloy_dyn_abi::Error },

    #[error("call index {0} is out of range for this batch")]
    CallIndexOutOfRange(usize),

    #[error("call {0} reverted")]
    Reverted(usize),

    #[error("call {0} returned no data")]
    EmptyReturnData(usize),

    #[error("failed to decode return data for call {index}: {source}")]
    Decode { index: usize, source: alloy_dyn_abi::Error },

    #[error("batch holds {count} calls, exceeding the configured limit of {max}")]
    TooManyCalls { count: usize, max: usize },
}
