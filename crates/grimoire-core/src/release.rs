use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::version::Version;

/// Account name marking a library that never consults a remote source.
pub const LOCAL_ONLY_ACCOUNT: &str = "*";

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("grimoire/", env!("CARGO_PKG_VERSION"));

/// One upgrade candidate, or the outcome of a check that found none.
///
/// A zero `version` with `check_failed == false` means the query succeeded
/// and nothing qualified. `check_failed == true` means the query itself
/// failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    pub notes: String,
    pub download_url: String,
    pub check_failed: bool,
}

impl Release {
    #[must_use]
    pub fn up_to_date() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failed() -> Self {
        Self {
            check_failed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_update(&self) -> bool {
        !self.check_failed && !self.version.is_zero()
    }
}

/// What a front end should show for a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Checking,
    UpToDate,
    Available(Version),
    Failed,
}

impl UpdateStatus {
    #[must_use]
    pub fn from_upgrade(upgrade: Option<&Release>) -> Self {
        match upgrade {
            None => Self::Checking,
            Some(release) if release.check_failed => Self::Failed,
            Some(release) if release.version.is_zero() => Self::UpToDate,
            Some(release) => Self::Available(release.version),
        }
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checking => write!(f, "checking"),
            Self::UpToDate => write!(f, "up to date"),
            Self::Available(version) => write!(f, "update available to v{version}"),
            Self::Failed => write!(f, "unable to check"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub zipball_url: String,
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to decode response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request was cancelled")]
    Cancelled,
}

/// Remote host of library releases and their archives.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn list_releases(
        &self,
        account: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<GitHubRelease>, ReleaseError>;

    async fn fetch_archive(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ReleaseError>;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_api_base(http, DEFAULT_API_BASE)
    }

    #[must_use]
    pub fn with_api_base(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { http, api_base }
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, ReleaseError> {
        let response = self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept)
            .send()
            .await
            .map_err(|source| ReleaseError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(ReleaseError::HttpStatus {
                url: url.to_string(),
                status,
                body_snippet,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn list_releases(
        &self,
        account: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<GitHubRelease>, ReleaseError> {
        let url = format!("{}/repos/{account}/{repo}/releases?per_page=100", self.api_base);
        let fetch = async {
            let response = self.get(&url, "application/vnd.github+json").await?;
            response
                .json::<Vec<GitHubRelease>>()
                .await
                .map_err(|source| ReleaseError::Parse {
                    url: url.clone(),
                    source,
                })
        };

        tokio::select! {
            () = cancel.cancelled() => Err(ReleaseError::Cancelled),
            result = fetch => result,
        }
    }

    async fn fetch_archive(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ReleaseError> {
        let fetch = async {
            let response = self.get(url, "application/octet-stream").await?;
            response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|source| ReleaseError::Request {
                    url: url.to_string(),
                    source,
                })
        };

        tokio::select! {
            () = cancel.cancelled() => Err(ReleaseError::Cancelled),
            result = fetch => result,
        }
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

/// Discover the releases of `account/repo` that upgrade from `current`.
///
/// Only tags of the form `v<version>` are considered. Candidates older than
/// `current`, or for which `exclude(version, notes)` returns true, are
/// dropped. The rest are returned newest first, minus `current` itself when
/// it is the oldest survivor. A [`LOCAL_ONLY_ACCOUNT`] returns nothing
/// without touching the network.
///
/// # Errors
/// Returns an error when the release listing cannot be fetched or decoded.
pub async fn load_releases<F>(
    source: &dyn ReleaseSource,
    account: &str,
    repo: &str,
    current: Version,
    cancel: &CancellationToken,
    exclude: F,
) -> Result<Vec<Release>, ReleaseError>
where
    F: Fn(Version, &str) -> bool,
{
    if account == LOCAL_ONLY_ACCOUNT {
        return Ok(Vec::new());
    }

    let remote = source.list_releases(account, repo, cancel).await?;
    let releases = select_releases(remote, current, exclude);
    debug!(
        "{account}/{repo}: {} release(s) newer than {current}",
        releases.len()
    );
    Ok(releases)
}

fn select_releases<F>(remote: Vec<GitHubRelease>, current: Version, exclude: F) -> Vec<Release>
where
    F: Fn(Version, &str) -> bool,
{
    let mut releases: Vec<Release> = remote
        .into_iter()
        .filter_map(|entry| {
            let version = Version::parse(entry.tag_name.strip_prefix('v')?);
            if version.is_zero() || version < current {
                return None;
            }
            let notes = entry.body.unwrap_or_default();
            if exclude(version, &notes) {
                return None;
            }
            Some(Release {
                version,
                notes,
                download_url: entry.zipball_url,
                check_failed: false,
            })
        })
        .collect();

    releases.sort_by(|a, b| b.version.cmp(&a.version));
    if releases.last().is_some_and(|oldest| oldest.version == current) {
        releases.pop();
    }
    releases
}
