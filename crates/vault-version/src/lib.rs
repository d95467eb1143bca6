use git_version::git_version;
use target_info::Target;

lazy_static::lazy_static! {
    pub static ref SHORT_VERSION: String = VERSION.replace("vaultscan/", "");
}

/// Returns the current version of this build of vaultscan.
///
/// A plus-sign (`+`) is appended to the git commit if the tree is dirty.
/// Commit hash is omitted if the sources don't include git information.
///
/// ## Example
///
/// `vaultscan/v0.1.0-67da032+`
pub const VERSION: &str = git_version!(
    args = [
        "--always",
        "--dirty=+",
        "--abbrev=7",
        "--match=thiswillnevermatchlol"
    ],
    prefix = "vaultscan/v0.1.0-",
    fallback = "vaultscan/v0.1.0"
);

/// Returns the first eight characters of the latest commit hash for this build.
pub const COMMIT_PREFIX: &str = git_version!(
    args = ["--always", "--abbrev=8", "--match=thiswillnevermatchlol"],
    prefix = "",
    suffix = "",
    cargo_prefix = "",
    cargo_suffix = "",
    fallback = "00000000"
);

/// Returns `VERSION`, but with platform information appended to the end.
pub fn version_with_platform() -> String {
    format!("{}/{}-{}", VERSION, Target::arch(), Target::os())
}

#[cfg(test)]
mod test {
    use super::*;
    use regex::Regex;

    #[test]
    fn version_formatting() {
        let re = Regex::new(r"^vaultscan/v[0-9]+\.[0-9]+\.[0-9]+(-[[:xdigit:]]{7})?\+?$").unwrap();
        assert!(re.is_match(VERSION), "version doesn't match regex: {}", VERSION);
    }
}
