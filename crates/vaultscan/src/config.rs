//! Environment-driven configuration, per the surface documented for the core (§6):
//! `JSON_RPC_URL`, `SCAN_BACKEND`, `MAX_GETLOGS_RANGE`, `END_BLOCK`, `RESET_LEADS`,
//! `MAX_WORKERS`, `FREQUENCY`, `MIN_TVL`, `MAX_VAULTS`, plus the ambient `LOG_LEVEL` and
//! `RETRY_COUNT`/`SKIP_POST_PROCESSING` knobs the orchestrator consumes.

use std::{env, str::FromStr};

use crate::error::ScanError;

/// Which event-source backend discovery should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanBackend {
    /// Picks `Indexer` when one is configured, `Rpc` otherwise.
    #[default]
    Auto,
    Indexer,
    Rpc,
}

impl FromStr for ScanBackend {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ScanBackend::Auto),
            "indexer" => Ok(ScanBackend::Indexer),
            "rpc" => Ok(ScanBackend::Rpc),
            other => Err(ScanError::Config(format!("invalid SCAN_BACKEND: {other}"))),
        }
    }
}

/// Historical sampling cadence; converted to a per-chain block step via the externalised
/// block-time table (see `reader::block_time`) rather than a hardcoded constant, per the
/// open question in the design notes about undocumented per-chain block times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    Hourly,
    Daily,
}

impl FromStr for Frequency {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1h" | "hourly" => Ok(Frequency::Hourly),
            "1d" | "daily" => Ok(Frequency::Daily),
            other => Err(ScanError::Config(format!("invalid FREQUENCY: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_url: String,
    pub scan_backend: ScanBackend,
    pub max_getlogs_range: u32,
    pub end_block: Option<u64>,
    pub reset_leads: bool,
    pub max_workers: u32,
    pub frequency: Frequency,
    pub min_tvl: Option<f64>,
    pub max_vaults: Option<u32>,
    pub log_level: String,
    pub retry_count: u32,
    pub skip_post_processing: bool,
}

impl Config {
    /// Reads the process environment, applying the documented defaults and failing with
    /// `ScanError::Config` (exit code 2) on a missing or malformed required variable.
    pub fn from_env() -> Result<Self, ScanError> {
        let json_rpc_url = env::var("JSON_RPC_URL")
            .map_err(|_| ScanError::Config("JSON_RPC_URL is required".into()))?;
        if json_rpc_url.trim().is_empty() {
            return Err(ScanError::Config("JSON_RPC_URL must not be empty".into()));
        }

        let scan_backend = optional_env("SCAN_BACKEND")?.unwrap_or_default();
        let max_getlogs_range = parse_env("MAX_GETLOGS_RANGE")?.unwrap_or(2_000);
        let end_block = parse_env("END_BLOCK")?;
        let reset_leads = parse_env("RESET_LEADS")?.unwrap_or(false);
        let max_workers = parse_env("MAX_WORKERS")?.unwrap_or(16);
        let frequency = optional_env("FREQUENCY")?.unwrap_or_default();
        let min_tvl = parse_env("MIN_TVL")?;
        let max_vaults = parse_env("MAX_VAULTS")?;
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let retry_count = parse_env("RETRY_COUNT")?.unwrap_or(3);
        let skip_post_processing = parse_env("SKIP_POST_PROCESSING")?.unwrap_or(false);

        if max_workers == 0 {
            return Err(ScanError::Config("MAX_WORKERS must be at least 1".into()));
        }

        Ok(Self {
            json_rpc_url,
            scan_backend,
            max_getlogs_range,
            end_block,
            reset_leads,
            max_workers,
            frequency,
            min_tvl,
            max_vaults,
            log_level,
            retry_count,
            skip_post_processing,
        })
    }
}

fn optional_env<T: FromStr<Err = ScanError>>(key: &str) -> Result<Option<T>, ScanError> {
    match env::var(key) {
        Ok(raw) => T::from_str(&raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ScanError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ScanError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_rpc_url_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("JSON_RPC_URL");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("JSON_RPC_URL", "https://example.invalid/rpc");
        for key in [
            "SCAN_BACKEND",
            "MAX_GETLOGS_RANGE",
            "END_BLOCK",
            "RESET_LEADS",
            "MAX_WORKERS",
            "FREQUENCY",
            "MIN_TVL",
            "MAX_VAULTS",
            "RETRY_COUNT",
            "SKIP_POST_PROCESSING",
        ] {
            env::remove_var(key);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.scan_backend, ScanBackend::Auto);
        assert_eq!(config.max_getlogs_range, 2_000);
        assert_eq!(config.max_workers, 16);
        assert_eq!(config.retry_count, 3);
        assert!(!config.reset_leads);
        env::remove_var("JSON_RPC_URL");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("JSON_RPC_URL", "https://example.invalid/rpc");
        env::set_var("MAX_WORKERS", "0");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        env::remove_var("JSON_RPC_URL");
        env::remove_var("MAX_WORKERS");
    }
}
