//! Shared value types and filesystem helpers used across the vaultscan workspace.

pub use alloy_primitives;

pub mod address;
pub mod chain;
pub mod decimal;

/// Constants and helper functions for the vaultscan data directory layout.
pub mod dirs;

pub mod fs;

pub use address::Address;
pub use chain::ChainId;
pub use decimal::Decimal;
