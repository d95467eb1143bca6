// Contains code from Lighthouse, via the bion CLI's directory layout.

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};

/// Names for the default directories under the data root.
pub const DEFAULT_ROOT_DIR: &str = ".vaultscan";
pub const DEFAULT_STORE_DIR: &str = "store";
pub const DEFAULT_TOKEN_CACHE_DIR: &str = "token-cache";

/// Checks if a directory exists in the given path and creates a directory if it does not exist.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        create_dir_all(path)?;
    }

    Ok(())
}

/// Get the default vaultscan data directory (`~/.vaultscan`, falling back to `.` when the home
/// directory can't be resolved).
pub fn data_dir() -> PathBuf {
    dirs::home_dir().map(|home| home.join(DEFAULT_ROOT_DIR)).unwrap_or_else(|| PathBuf::from("."))
}

pub fn store_dir(root: &Path) -> PathBuf {
    root.join(DEFAULT_STORE_DIR)
}

pub fn token_cache_dir(root: &Path) -> PathBuf {
    root.join(DEFAULT_TOKEN_CACHE_DIR)
}
