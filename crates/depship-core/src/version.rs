/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the installed binary.
pub const BIN_NAME: &str = "copy-production-deps";

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    match option_env!("DEPSHIP_BUILD_GIT_HASH") {
        Some(hash) => format!("{BIN_NAME} {VERSION} ({hash})"),
        None => format!("{BIN_NAME} {VERSION}"),
    }
}
