pub mod erc20;
pub mod erc4626;
pub mod euler;
pub mod gearbox;
pub mod ipor;
pub mod probes;

pub use erc4626::IErc4626;
pub use euler::IEulerVault;
pub use gearbox::IGearboxPool;
pub use ipor::IIporFeeConfig;
pub use probes::IProtocolProbes;
