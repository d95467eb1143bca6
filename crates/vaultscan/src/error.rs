//! The error taxonomy shared by every component of the scanning engine.
//!
//! Each variant maps to one of the failure modes a vault scan can hit: transport errors are
//! retryable, reverts and decode failures are recorded as data rather than raised, and
//! `Config`/`ClassificationConflict` stop processing of the thing they apply to (the whole
//! process for `Config`, a single vault for `ClassificationConflict`).

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("call reverted: {0}")]
    Revert(String),

    #[error("malformed return data for {label}: {reason}")]
    Decode { label: String, reason: String },

    #[error("classification conflict for vault {chain_id}:{address}: {detail}")]
    ClassificationConflict { chain_id: i64, address: String, detail: String },

    #[error("token metadata unreadable for {chain_id}:{address}")]
    TokenUnreadable { chain_id: i64, address: String },

    #[error("call {label} exceeded the gas budget ({gas_used} > {budget})")]
    GasPathology { label: String, gas_used: u64, budget: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] eyre::Error),
}

impl ScanError {
    /// Maps a `ScanError` to the process exit code documented for the CLI: 0 success
    /// (handled by the caller, not here), 1 for any unrecoverable error, 2 for `Config`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::Config(_) => 2,
            _ => 1,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ScanError::Transport(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_code_2() {
        assert_eq!(ScanError::Config("missing JSON_RPC_URL".into()).exit_code(), 2);
    }

    #[test]
    fn other_errors_exit_with_code_1() {
        assert_eq!(ScanError::Revert("maxDeposit".into()).exit_code(), 1);
        assert_eq!(
            ScanError::TokenUnreadable { chain_id: 1, address: "0x0".into() }.exit_code(),
            1
        );
    }
}
