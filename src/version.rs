// Build-time identity, used by GET /version and the upstream User-Agent.

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `name/version`, sent as User-Agent on upstream API calls.
pub fn user_agent() -> String {
    format!("{}/{}", NAME, VERSION)
}
