//! User-Agent string for requests to the tablet's web interface.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/rmexport";

/// User-Agent sent with every web interface request (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("rmexport/{version} (+{PROJECT_UA_URL})")
}
