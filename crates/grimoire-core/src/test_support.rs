use std::io::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::release::{GitHubRelease, ReleaseError, ReleaseSource};

pub fn github_release(tag: &str, notes: &str) -> GitHubRelease {
    GitHubRelease {
        tag_name: tag.to_string(),
        body: Some(notes.to_string()),
        zipball_url: format!("https://example.invalid/{tag}.zip"),
    }
}

/// In-memory [`ReleaseSource`] for unit tests.
#[derive(Default)]
pub struct FakeSource {
    releases: Vec<GitHubRelease>,
    failing_repos: Vec<String>,
    fail_all: bool,
    archive: Vec<u8>,
    list_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_releases(releases: Vec<GitHubRelease>) -> Self {
        Self {
            releases,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn fail_repo(mut self, repo: &str) -> Self {
        self.failing_repos.push(repo.to_string());
        self
    }

    pub fn with_archive(mut self, archive: Vec<u8>) -> Self {
        self.archive = archive;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for FakeSource {
    async fn list_releases(
        &self,
        _account: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<GitHubRelease>, ReleaseError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(ReleaseError::Cancelled);
        }
        if self.fail_all || self.failing_repos.iter().any(|failing| failing == repo) {
            return Err(ReleaseError::HttpStatus {
                url: format!("fake://{repo}"),
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body_snippet: String::new(),
            });
        }
        Ok(self.releases.clone())
    }

    async fn fetch_archive(
        &self,
        _url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ReleaseError> {
        if cancel.is_cancelled() {
            return Err(ReleaseError::Cancelled);
        }
        Ok(self.archive.clone())
    }
}

/// Build an in-memory zip whose entries are `(name, contents)`; names ending
/// in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, options)
                .expect("directory entry should be written");
        } else {
            writer
                .start_file(*name, options)
                .expect("file entry should be started");
            writer
                .write_all(contents.as_bytes())
                .expect("file entry should be written");
        }
    }
    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}
