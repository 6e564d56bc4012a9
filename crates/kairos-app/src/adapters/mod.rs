//! HTTP clients for the collaborators the engine reaches over the network.

pub mod directory;
pub mod ledger;

pub use directory::HttpDirectory;
pub use ledger::HttpLedger;

/// Reads a response body for an error report. An unreadable body is reported as empty.
async fn error_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}
