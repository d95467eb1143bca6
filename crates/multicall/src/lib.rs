//! Batches read-only EVM calls into Multicall3 `aggregate3` requests.

mod addresses;
mod contract;
mod error;
mod middleware;

pub use addresses::*;
pub use contract::IMulticall3;
pub use error::*;
pub use middleware::*;
