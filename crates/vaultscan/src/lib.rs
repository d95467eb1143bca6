//! The ERC-4626 vault discovery, classification and historical scanning engine.
//!
//! Module layout mirrors the component breakdown: [`models`] is the shared data model,
//! [`evm`] is the transport capability boundary, [`classify`]/[`discovery`]/[`reader`] are
//! C4/C5/C6, [`store`] is C7, [`orchestrator`] is C8, and [`token_cache`]/[`batch`] are the
//! C3/C2 support layers everything else dispatches calls through.

pub mod batch;
pub mod classify;
pub mod cmd;
pub mod config;
pub mod contracts;
pub mod discovery;
pub mod error;
pub mod evm;
pub mod models;
pub mod orchestrator;
pub mod reader;
pub mod store;
pub mod token_cache;
