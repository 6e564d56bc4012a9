pub use kairos_core::config::*;

use crate::error::AppResult;

/// Header sent with every request to a remote collaborator.
const USER_AGENT: &str = const_str::concat!("kairos/", env!("CARGO_PKG_VERSION"));

/// ## Summary
/// Builds the HTTP client used to talk to a remote collaborator, bounded by its configured
/// timeout.
///
/// ## Errors
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(remote: &RemoteServiceConfig) -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(remote.timeout())
        .user_agent(USER_AGENT)
        .build()?)
}
