/// Build constants for the regtoken package.
/// Values come from compile-time environment variables with defaults.

/// Source control information.
pub struct Source;

impl Source {
    /// The commit hash from which this binary was built.
    /// Set via the `REGTOKEN_COMMIT_HASH` env var at compile time, or "N/A".
    pub const COMMIT_HASH: &'static str = match option_env!("REGTOKEN_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };
}

/// Package metadata.
#[derive(Debug, Clone)]
pub struct Package;

impl Package {
    /// Product name sent in the `User-Agent` header.
    pub const NAME: &'static str = "regtoken";

    /// The semantic version, pulled from `CARGO_PKG_VERSION`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// `<name>/<version>` as used in the `User-Agent` header.
    pub fn user_agent() -> String {
        format!("{}/{}", Self::NAME, Self::VERSION)
    }
}
