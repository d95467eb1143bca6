//! The data model shared by discovery, classification, the historical reader and the
//! reader-state store: `VaultSpec` identity, `EncodedCall`/`CallResult` at the C1/C2
//! boundary, the `Feature`/`FeatureSet` classification vocabulary, and the persisted
//! `VaultRecord`/`VaultReaderState`/`HistoricalRead` records.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use alloy_primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};
use vaultscan_primitives::{Address, ChainId, Decimal};

/// Identity of a vault: the `(chain_id, address)` pair is the system-wide key everywhere
/// records, reader state, rejects and the token cache are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VaultSpec {
    pub chain_id: ChainId,
    pub address: Address,
}

impl VaultSpec {
    pub fn new(chain_id: ChainId, address: Address) -> Self {
        Self { chain_id, address }
    }

    /// Stable string key used by the redb-backed stores (`{chain_id}:{address}`).
    pub fn store_key(&self) -> String {
        format!("{}:{}", self.chain_id, self.address.canonical())
    }
}

impl fmt::Display for VaultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.store_key())
    }
}

/// The first 4 bytes of `keccak256(canonical_signature)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&hash[..4]);
        Self(bytes)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// One `(address, selector, argdata)` call, tagged with a human label and an opaque
/// passthrough map used to demultiplex results back to the strategy that issued them.
///
/// `args` never repeats the selector: it is the ABI-encoded parameter payload only, the
/// selector is carried separately so a backend can prepend it (or not, for backends that
/// address calls out of band, like an event-index lookup).
#[derive(Debug, Clone)]
pub struct EncodedCall {
    pub target: Address,
    pub selector: Selector,
    pub args: Bytes,
    pub function_label: String,
    pub extra: BTreeMap<String, String>,
}

impl EncodedCall {
    /// Builds a call from a canonical Solidity signature and pre-encoded arguments.
    /// Per C1's contract, malformed argument encoding is a caller bug, not a recoverable
    /// runtime condition — call sites encode through `alloy_sol_types` and are expected to
    /// never hand this constructor a mismatched payload.
    pub fn build(target: Address, signature: &str, encoded_args: Bytes) -> Self {
        Self {
            target,
            selector: Selector::from_signature(signature),
            args: encoded_args,
            function_label: signature.to_string(),
            extra: BTreeMap::new(),
        }
    }

    /// Builds a call whose selector is already known (probes discovered as raw 4-byte
    /// values with no recovered human-readable signature).
    pub fn build_raw(target: Address, selector: [u8; 4], argdata: Bytes, label: &str) -> Self {
        Self {
            target,
            selector: Selector(selector),
            args: argdata,
            function_label: label.to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    /// The full calldata: selector followed by the argument payload.
    pub fn calldata(&self) -> Bytes {
        let mut out = Vec::with_capacity(4 + self.args.len());
        out.extend_from_slice(&self.selector.0);
        out.extend_from_slice(&self.args);
        out.into()
    }
}

/// Outcome of dispatching one [`EncodedCall`].
#[derive(Debug, Clone)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
    pub block: u64,
    pub revert_reason: Option<String>,
}

impl CallResult {
    pub fn ok(return_data: Bytes, block: u64) -> Self {
        Self { success: true, return_data, block, revert_reason: None }
    }

    pub fn reverted(block: u64, reason: Option<String>) -> Self {
        Self { success: false, return_data: Bytes::new(), block, revert_reason: reason }
    }
}

/// `function_label → CallResult`. Insertion order is irrelevant, hence `BTreeMap` rather
/// than a `Vec` of pairs.
pub type CapabilitySet = BTreeMap<String, CallResult>;

/// A reference to an ERC-20 token resolved by the token cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: Address,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: u8,
}

/// One tag from the fixed, ~60-member classification vocabulary. Non-exhaustive by
/// design: the registry in `classify::registry` is the single place new protocols are
/// added, this enum is its vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Feature {
    /// Assigned when no protocol-specific feature matched but the ERC-4626 baseline probes
    /// (`asset`, `totalAssets`, `convertToShares`, `convertToAssets`) all succeeded.
    Erc4626Baseline,

    // Lending / money-market vaults
    AaveV3Like,
    CompoundV3Like,
    EulerLike,
    GearboxLike,
    MorphoV1Like,
    MorphoBlueLike,
    FluidLike,
    SiloLike,
    RadiantLike,
    SparkLike,
    NotionalLike,

    // Liquid-restaking / staking vaults
    IporLike,
    LidoLike,
    EtherFiLike,
    RenzoLike,
    KelpDaoLike,
    SwellLike,
    PuffIpLike,
    SymbioticLike,
    EigenLayerLike,

    // Yield aggregators / strategy vaults
    YearnV2Like,
    YearnV3Like,
    BeefyLike,
    HarvestLike,
    SommelierLike,
    ConcreteLike,
    ReserveLike,
    TokemakLike,

    // Async / request-based redemption vaults
    Erc7540Like,
    LagoonLike,
    CentrifugeLike,
    ClearPoolLike,
    MapleLike,
    GoldfinchLike,
    TrueFiLike,

    // Options / structured-product vaults
    RibbonLike,
    DopexLike,
    PenduleLike,
    PanopticLike,

    // Perp / derivatives-adjacent vaults
    HypercorePerp,
    GmxLike,
    GainsNetworkLike,
    SynthetixLike,
    PerennialLike,

    // Stablecoin / RWA vaults
    AngleLike,
    FraxLike,
    OndoLike,
    BackedLike,
    MountainProtocolLike,

    // LP / AMM-adjacent vaults
    UniswapV3ManagerLike,
    GammaLike,
    ArrakisLike,
    CharmLike,
    SteerLike,

    // Misc protocol fingerprints
    ConvexLike,
    PirexLike,
    StakeDaoLike,
    VotiumLike,
    ResupplyLike,

    /// Additive: the vault is an internal vault of a parent strategy, not independently
    /// investable. Can co-exist with any protocol feature.
    Subvault,

    /// Additive: the vault routes deposits into perpetual-DEX trading strategies.
    PerpDexTradingVault,

    /// Additive: the vault's feature was assigned via the hardcoded single-instance
    /// registry rather than probing, per C4 rule 1.
    HardcodedProtocol,

    /// Additive: the vault's capability set tripped a heuristic suggesting unreliable
    /// classification (e.g. a probe that always reverts elsewhere on this chain
    /// unexpectedly succeeded). Surfaced for human triage, not acted on automatically.
    BadFlags,
}

impl Feature {
    /// Whether this tag identifies a protocol (at most one may be present per
    /// `FeatureSet`, barring additive tags) versus describing an orthogonal property.
    pub fn is_additive(self) -> bool {
        matches!(
            self,
            Feature::Subvault | Feature::PerpDexTradingVault | Feature::HardcodedProtocol | Feature::BadFlags
        )
    }

    /// Human-readable protocol name derived from the feature, used for `VaultRecord::protocol_name`.
    pub fn protocol_name(self) -> &'static str {
        match self {
            Feature::Erc4626Baseline => "Generic ERC-4626",
            Feature::AaveV3Like => "Aave V3",
            Feature::CompoundV3Like => "Compound V3",
            Feature::EulerLike => "Euler",
            Feature::GearboxLike => "Gearbox",
            Feature::MorphoV1Like => "Morpho V1",
            Feature::MorphoBlueLike => "Morpho Blue",
            Feature::FluidLike => "Fluid",
            Feature::SiloLike => "Silo",
            Feature::RadiantLike => "Radiant",
            Feature::SparkLike => "Spark",
            Feature::NotionalLike => "Notional",
            Feature::IporLike => "IPOR",
            Feature::LidoLike => "Lido",
            Feature::EtherFiLike => "Ether.fi",
            Feature::RenzoLike => "Renzo",
            Feature::KelpDaoLike => "Kelp DAO",
            Feature::SwellLike => "Swell",
            Feature::PuffIpLike => "Puffer",
            Feature::SymbioticLike => "Symbiotic",
            Feature::EigenLayerLike => "EigenLayer",
            Feature::YearnV2Like => "Yearn V2",
            Feature::YearnV3Like => "Yearn V3",
            Feature::BeefyLike => "Beefy",
            Feature::HarvestLike => "Harvest",
            Feature::SommelierLike => "Sommelier",
            Feature::ConcreteLike => "Concrete",
            Feature::ReserveLike => "Reserve",
            Feature::TokemakLike => "Tokemak",
            Feature::Erc7540Like => "ERC-7540",
            Feature::LagoonLike => "Lagoon",
            Feature::CentrifugeLike => "Centrifuge",
            Feature::ClearPoolLike => "Clearpool",
            Feature::MapleLike => "Maple",
            Feature::GoldfinchLike => "Goldfinch",
            Feature::TrueFiLike => "TrueFi",
            Feature::RibbonLike => "Ribbon",
            Feature::DopexLike => "Dopex",
            Feature::PenduleLike => "Pendle",
            Feature::PanopticLike => "Panoptic",
            Feature::HypercorePerp => "Hyperliquid HyperCore Perp",
            Feature::GmxLike => "GMX",
            Feature::GainsNetworkLike => "Gains Network",
            Feature::SynthetixLike => "Synthetix",
            Feature::PerennialLike => "Perennial",
            Feature::AngleLike => "Angle",
            Feature::FraxLike => "Frax",
            Feature::OndoLike => "Ondo",
            Feature::BackedLike => "Backed",
            Feature::MountainProtocolLike => "Mountain Protocol",
            Feature::UniswapV3ManagerLike => "Uniswap V3 Manager",
            Feature::GammaLike => "Gamma",
            Feature::ArrakisLike => "Arrakis",
            Feature::CharmLike => "Charm",
            Feature::SteerLike => "Steer",
            Feature::ConvexLike => "Convex",
            Feature::PirexLike => "Pirex",
            Feature::StakeDaoLike => "StakeDAO",
            Feature::VotiumLike => "Votium",
            Feature::ResupplyLike => "Resupply",
            Feature::Subvault => "Subvault",
            Feature::PerpDexTradingVault => "Perp DEX Trading Vault",
            Feature::HardcodedProtocol => "Hardcoded Protocol",
            Feature::BadFlags => "Bad Flags",
        }
    }
}

/// Set of [`Feature`] tags describing a vault. At most one non-additive (protocol)
/// feature should be present; `classify` rejects attempts to add a second one as a
/// `CLASSIFICATION_CONFLICT` rather than silently overwriting.
pub type FeatureSet = BTreeSet<Feature>;

/// Orthogonal, persisted annotations that aren't part of the classification vocabulary
/// itself but ride alongside a `VaultRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    Subvault,
    PerpDexTradingVault,
    HardcodedProtocol,
    BadFlags,
}

pub type Flags = BTreeSet<Flag>;

/// A discovered, classified vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub key: VaultSpec,
    pub features: FeatureSet,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub denomination_token: Option<TokenRef>,
    pub share_token: Option<TokenRef>,
    pub first_seen_block: u64,
    pub deployment_tx: Option<B256>,
    pub protocol_name: String,
    pub flags: Flags,
    /// The EIP-1967 implementation address behind this vault, when its classified
    /// protocol's registry row opted into resolving it (`registry::resolve_proxy_for`) and
    /// the slot read succeeded. `None` for every vault whose protocol doesn't ask for it,
    /// and for one where the read failed — a vault isn't rejected over an unreadable slot.
    pub proxy_implementation: Option<Address>,
}

impl VaultRecord {
    /// Derives `protocol_name` from the feature set: the sole non-additive feature, or
    /// `"Unclassified"` if none is present (callers should not persist such a record —
    /// C4 rule 5 rejects it — but the helper stays total for diagnostics).
    pub fn derive_protocol_name(features: &FeatureSet) -> String {
        features
            .iter()
            .find(|f| !f.is_additive())
            .map(|f| f.protocol_name().to_string())
            .unwrap_or_else(|| "Unclassified".to_string())
    }
}

/// Durable per-function warmup outcome: the block the call was last checked at, and
/// whether it reverts (or is gas-pathological, which is recorded the same way since a
/// pruned call is pruned regardless of which condition triggered it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatus {
    pub check_block: u64,
    pub reverts: bool,
}

/// Durable per-vault scan bookkeeping. Deliberately duplicates `features` from
/// `VaultRecord` so C7 can stand alone (diagnostics and the reader only need this store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultReaderState {
    pub key: VaultSpec,
    pub last_scanned_block: Option<u64>,
    pub call_status: BTreeMap<String, CallStatus>,
    pub features: FeatureSet,
}

impl VaultReaderState {
    pub fn new(key: VaultSpec, features: FeatureSet) -> Self {
        Self { key, last_scanned_block: None, call_status: BTreeMap::new(), features }
    }

    pub fn is_pruned(&self, function_label: &str) -> bool {
        self.call_status.get(function_label).map(|s| s.reverts).unwrap_or(false)
    }
}

/// One block's worth of decoded historical data for a vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRead {
    pub key: VaultSpec,
    pub block: u64,
    pub timestamp: Option<u64>,
    pub total_assets: Option<Decimal>,
    pub total_supply: Option<Decimal>,
    pub share_price: Option<Decimal>,
    pub management_fee_bps: Option<u32>,
    pub performance_fee_bps: Option<u32>,
    pub available_liquidity: Option<Decimal>,
    pub utilisation: Option<Decimal>,
    pub errors: Vec<String>,
}

impl HistoricalRead {
    pub fn empty(key: VaultSpec, block: u64) -> Self {
        Self {
            key,
            block,
            timestamp: None,
            total_assets: None,
            total_supply: None,
            share_price: None,
            management_fee_bps: None,
            performance_fee_bps: None,
            available_liquidity: None,
            utilisation: None,
            errors: Vec::new(),
        }
    }

    /// Computes `share_price = total_assets / total_supply`, left `None` (not zero) when
    /// either operand is missing or `total_supply` is zero, per the invariant in §3.
    pub fn derive_share_price(&mut self) {
        self.share_price = match (self.total_assets, self.total_supply) {
            (Some(assets), Some(supply)) if !supply.is_zero() => assets.checked_div(supply),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn selector_is_first_four_bytes_of_signature_hash() {
        // keccak256("transfer(address,uint256)") = 0xa9059cbb...
        let selector = Selector::from_signature("transfer(address,uint256)");
        assert_eq!(selector.0, [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn derive_protocol_name_picks_the_sole_non_additive_feature() {
        let mut features = FeatureSet::new();
        features.insert(Feature::Subvault);
        features.insert(Feature::IporLike);
        assert_eq!(VaultRecord::derive_protocol_name(&features), "IPOR");
    }

    #[test]
    fn derive_protocol_name_falls_back_when_nothing_matched() {
        let features = FeatureSet::new();
        assert_eq!(VaultRecord::derive_protocol_name(&features), "Unclassified");
    }

    #[test]
    fn share_price_is_none_not_zero_when_supply_is_zero() {
        let key = VaultSpec::new(ChainId::from(1u64), Address::from_str("0x0000000000000000000000000000000000000001").unwrap());
        let mut read = HistoricalRead::empty(key, 100);
        read.total_assets = Some(Decimal::from_token_amount(alloy_primitives::U256::from(10u64), 0));
        read.total_supply = Some(Decimal::zero());
        read.derive_share_price();
        assert!(read.share_price.is_none());
    }

    #[test]
    fn call_status_prunes_reverting_labels() {
        let key = VaultSpec::new(ChainId::from(1u64), Address::from_str("0x0000000000000000000000000000000000000001").unwrap());
        let mut state = VaultReaderState::new(key, FeatureSet::new());
        state.call_status.insert("maxDeposit".into(), CallStatus { check_block: 10, reverts: true });
        assert!(state.is_pruned("maxDeposit"));
        assert!(!state.is_pruned("totalAssets"));
    }
}
