/// Build constants for the fleet binaries.
/// Values come from compile-time environment variables with fallbacks.

/// Source control information.
pub struct Source;

impl Source {
    /// The commit hash from which this binary was built.
    /// Set via the `FLEET_COMMIT_HASH` env var at compile time, or "N/A".
    pub const COMMIT_HASH: &'static str = match option_env!("FLEET_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };
}

/// Package metadata.
#[derive(Debug, Clone)]
pub struct FleetPackage;

impl FleetPackage {
    /// The semantic version of runner-fleet, from `Cargo.toml`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// Product name used in user agents and help output.
    pub const PRODUCT_NAME: &'static str = "runner-fleet";

    /// User-Agent header value for outbound HTTP requests.
    pub fn user_agent() -> String {
        format!("{}/{}", Self::PRODUCT_NAME, Self::VERSION)
    }
}
