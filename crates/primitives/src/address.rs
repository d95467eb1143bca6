use std::fmt;

use alloy_primitives::Address as AlloyAddress;

/// A 20-byte address, always rendered and compared in canonical lowercase-hex form.
///
/// EIP-55 mixed-case checksums are a presentation concern; every key used for discovery
/// dedup, classification lookups and persisted vault records must compare equal regardless
/// of how the address was originally cased in a log or RPC response, so this wraps
/// [`AlloyAddress`] and always formats through its lowercase hex path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Address(AlloyAddress);

impl Address {
    pub const fn new(inner: AlloyAddress) -> Self {
        Self(inner)
    }

    pub const fn into_inner(self) -> AlloyAddress {
        self.0
    }

    pub const fn as_inner(&self) -> &AlloyAddress {
        &self.0
    }

    /// Canonical lowercase-hex form with a `0x` prefix, suitable as a store key.
    pub fn canonical(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl From<AlloyAddress> for Address {
    fn from(inner: AlloyAddress) -> Self {
        Self(inner)
    }
}

impl From<Address> for AlloyAddress {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl std::str::FromStr for Address {
    type Err = alloy_primitives::AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlloyAddress::from_str(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mixed_case_and_lowercase_addresses_compare_equal() {
        let checksummed = Address::from_str("0x52908400098527886E0F7030069857D2E4169EE").unwrap();
        let lower = Address::from_str("0x52908400098527886e0f7030069857d2e4169ee").unwrap();
        assert_eq!(checksummed, lower);
        assert_eq!(checksummed.canonical(), lower.canonical());
    }

    #[test]
    fn canonical_form_is_lowercase_with_0x_prefix() {
        let addr = Address::from_str("0x52908400098527886E0F7030069857D2E4169EE").unwrap();
        let canonical = addr.canonical();
        assert!(canonical.starts_with("0x"));
        assert_eq!(canonical, canonical.to_lowercase());
    }
}
