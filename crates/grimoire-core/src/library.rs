use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::archive::{self, ArchiveError};
use crate::release::{LOCAL_ONLY_ACCOUNT, Release, ReleaseError, ReleaseSource, load_releases};
use crate::version::Version;

pub const MASTER_ACCOUNT: &str = "richardwilkes";
pub const MASTER_REPO: &str = "gcs_master_library";
pub const MASTER_TITLE: &str = "Master Library";
pub const USER_REPO: &str = "gcs_user_library";
pub const USER_TITLE: &str = "User Library";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library path must not be empty")]
    EmptyPath,
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch library release: {0}")]
    Fetch(#[from] ReleaseError),
    #[error("failed to unpack library release: {0}")]
    Archive(#[from] ArchiveError),
}

impl LibraryError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Range of library versions this build can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradePolicy {
    /// Oldest acceptable version (inclusive).
    pub minimum: Version,
    /// First version with an incompatible data format (exclusive).
    pub incompatible_future: Version,
}

impl UpgradePolicy {
    #[must_use]
    pub fn excludes(&self, version: Version) -> bool {
        version < self.minimum || version >= self.incompatible_future
    }
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self {
            minimum: Version::new(4, 0, 0),
            incompatible_future: Version::new(6, 0, 0),
        }
    }
}

/// A named, versioned collection of data files backed by a GitHub repo.
///
/// The upgrade slot is written by background checks while front ends read
/// it, so it sits behind a lock and is only ever handed out as a copy.
#[derive(Debug, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "github_account")]
    account: String,
    #[serde(default)]
    repo: String,
    #[serde(default)]
    path: PathBuf,
    #[serde(default)]
    last_seen: Version,
    #[serde(skip)]
    upgrade: RwLock<Option<Release>>,
}

impl Library {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        account: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let mut library = Self {
            title: title.into(),
            account: account.into(),
            repo: repo.into(),
            path: path.into(),
            last_seen: Version::ZERO,
            upgrade: RwLock::new(None),
        };
        library.mark_seen();
        library
    }

    #[must_use]
    pub fn master(library_root: &Path) -> Self {
        Self::new(
            MASTER_TITLE,
            MASTER_ACCOUNT,
            MASTER_REPO,
            library_root.join(MASTER_TITLE),
        )
    }

    #[must_use]
    pub fn user(library_root: &Path) -> Self {
        Self::new(
            USER_TITLE,
            LOCAL_ONLY_ACCOUNT,
            USER_REPO,
            library_root.join(USER_TITLE),
        )
    }

    #[must_use]
    pub fn key(&self) -> String {
        library_key(&self.account, &self.repo)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn last_seen(&self) -> Version {
        self.last_seen
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.account == MASTER_ACCOUNT && self.repo == MASTER_REPO
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.account == LOCAL_ONLY_ACCOUNT && self.repo == USER_REPO
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.account.trim().is_empty()
            && !self.repo.trim().is_empty()
            && !self.path.as_os_str().is_empty()
    }

    /// Version recorded in the library directory's marker file.
    ///
    /// Re-reads the marker on every call. A library that was never downloaded
    /// reports zero; a marker that exists but can't be read or parsed also
    /// reports zero, with a warning.
    #[must_use]
    pub fn version_on_disk(&self) -> Version {
        match archive::read_version_marker(&self.path) {
            Ok(None) => Version::ZERO,
            Ok(Some(text)) => match text.parse() {
                Ok(version) => version,
                Err(error) => {
                    warn!("Corrupt version marker in {}: {error}", self.path.display());
                    Version::ZERO
                }
            },
            Err(error) => {
                warn!(
                    "Unable to read version marker in {}: {error}",
                    self.path.display()
                );
                Version::ZERO
            }
        }
    }

    /// Record the version currently on disk as seen.
    pub fn mark_seen(&mut self) {
        self.last_seen = self.version_on_disk();
    }

    /// Point the library at a new directory.
    ///
    /// # Errors
    /// Returns an error when `path` is empty or cannot be made absolute.
    pub fn set_path(&mut self, path: impl AsRef<Path>) -> Result<(), LibraryError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(LibraryError::EmptyPath);
        }
        let absolute = std::path::absolute(path)
            .map_err(|error| LibraryError::io("unable to resolve library path", path, error))?;
        if absolute != self.path {
            info!(
                "Moving library {} from {} to {}",
                self.key(),
                self.path.display(),
                absolute.display()
            );
            self.path = absolute;
        }
        self.mark_seen();
        Ok(())
    }

    /// Snapshot of the most recent upgrade check, if one has finished.
    #[must_use]
    pub fn available_update(&self) -> Option<Release> {
        self.upgrade
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_upgrade(&self, upgrade: Option<Release>) {
        *self
            .upgrade
            .write()
            .unwrap_or_else(PoisonError::into_inner) = upgrade;
    }

    /// Query the release host for a newer version of this library.
    ///
    /// Never fails: any error is logged and recorded as a failed check, so
    /// the slot always ends up holding a result.
    pub async fn check_for_available_upgrade(
        &self,
        source: &dyn ReleaseSource,
        policy: &UpgradePolicy,
        cancel: &CancellationToken,
    ) {
        self.set_upgrade(None);

        let result = load_releases(
            source,
            &self.account,
            &self.repo,
            self.version_on_disk(),
            cancel,
            |version, _| policy.excludes(version),
        )
        .await;

        let upgrade = match result {
            Ok(releases) => combine_releases(releases),
            Err(error) => {
                warn!("Unable to check {} for updates: {error}", self.key());
                Release::failed()
            }
        };
        self.set_upgrade(Some(upgrade));
    }

    /// Download `release` and unpack it over the library directory.
    ///
    /// Files already extracted stay in place if a later step fails.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created, the archive
    /// cannot be fetched or unpacked, or the version marker cannot be written.
    pub async fn download(
        &self,
        source: &dyn ReleaseSource,
        release: &Release,
        cancel: &CancellationToken,
    ) -> Result<(), LibraryError> {
        std::fs::create_dir_all(&self.path).map_err(|error| {
            LibraryError::io("failed to create library directory", &self.path, error)
        })?;

        info!(
            "Downloading {} v{} from {}",
            self.key(),
            release.version,
            release.download_url
        );
        let bytes = source.fetch_archive(&release.download_url, cancel).await?;
        let count = archive::extract_library_archive(&bytes, &self.path)?;
        archive::write_version_marker(&self.path, release.version)?;

        info!(
            "Installed {} v{} ({count} files) into {}",
            self.key(),
            release.version,
            self.path.display()
        );
        Ok(())
    }
}

#[must_use]
pub fn library_key(account: &str, repo: &str) -> String {
    format!("{account}/{repo}")
}

/// Collapse newest-first candidates into one release whose notes include
/// the changelog of every older candidate.
fn combine_releases(releases: Vec<Release>) -> Release {
    let mut releases = releases.into_iter();
    let Some(mut newest) = releases.next() else {
        return Release::up_to_date();
    };
    for older in releases {
        let _ = write!(newest.notes, "\n\n## Version {}\n{}", older.version, older.notes);
    }
    newest
}
