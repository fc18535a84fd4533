const CI_TAG: &str = env!("BUILD_NUMBER_CI_TAG");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The version of this tool; the CI tag when one was baked in at
/// build time, the crate version otherwise.
pub fn tool_version() -> &'static str {
    if CI_TAG.is_empty() {
        PKG_VERSION
    } else {
        CI_TAG
    }
}

pub fn user_agent() -> String {
    format!("build-number/{}", tool_version())
}
