use std::fmt;

/// A chain identifier.
///
/// Most chains use the standard unsigned EVM chain id space, but a handful of synthetic,
/// negative values (e.g. `-999`) are used upstream to denote non-EVM ingest sources (CEX
/// venues folded into the same vault pipeline). This core never dereferences a synthetic
/// id to RPC, but it must round-trip it unchanged through discovery, classification and
/// persistence, so the value is kept as a signed integer rather than truncated to `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChainId(i64);

impl ChainId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// True for the reserved synthetic namespace used by non-EVM ingest sources.
    pub const fn is_synthetic(self) -> bool {
        self.0 < 0
    }

    /// The standard EVM chain id, if this isn't a synthetic value.
    pub fn as_evm_chain_id(self) -> Option<u64> {
        if self.is_synthetic() {
            None
        } else {
            Some(self.0 as u64)
        }
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value as i64)
    }
}

impl From<i64> for ChainId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_synthetic_ids() {
        let synthetic = ChainId::new(-999);
        assert!(synthetic.is_synthetic());
        assert_eq!(synthetic.as_evm_chain_id(), None);
        assert_eq!(synthetic.value(), -999);
    }

    #[test]
    fn evm_ids_convert_cleanly() {
        let mainnet = ChainId::from(1u64);
        assert!(!mainnet.is_synthetic());
        assert_eq!(mainnet.as_evm_chain_id(), Some(1));
    }

    #[test]
    fn ordering_and_equality_are_by_value() {
        let a = ChainId::new(1);
        let b = ChainId::new(2);
        assert!(a < b);
        assert_eq!(ChainId::new(1), ChainId::from(1u64));
    }
}
