use grimoire_core::{LibraryError, RegistryError, ReleaseError, Version};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to save settings: {0}")]
    SaveSettings(#[source] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("failed to list releases: {0}")]
    Release(#[from] ReleaseError),

    #[error("{key} is stored locally only and has nothing to download")]
    LocalOnly { key: String },

    #[error("unable to check {key} for updates")]
    CheckFailed { key: String },

    #[error("{key} has no downloadable release v{version}")]
    NoSuchRelease { key: String, version: Version },
}
