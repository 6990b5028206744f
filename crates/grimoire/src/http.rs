use std::time::Duration;

use grimoire_core::GitHubClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
}

/// GitHub release client with the given request timeout, pointed at
/// `api_base` when one is configured.
pub fn github_client(
    timeout: Duration,
    api_base: Option<&str>,
) -> Result<GitHubClient, reqwest::Error> {
    let http = build_http_client(timeout)?;
    Ok(match api_base {
        Some(base) => GitHubClient::with_api_base(http, base),
        None => GitHubClient::new(http),
    })
}
