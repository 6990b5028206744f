use grimoire_core::{Libraries, UpgradePolicy, Version};
use grimoire_platform::{AppPaths, AppPathsError};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub libraries: Libraries,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_update_check_timeout")]
    pub update_check_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default = "default_minimum_library_version")]
    pub minimum_library_version: Version,

    #[serde(default = "default_incompatible_library_version")]
    pub incompatible_library_version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_api_base: Option<String>,
}

fn default_http_timeout() -> u64 {
    10
}

fn default_update_check_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    300
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_minimum_library_version() -> Version {
    UpgradePolicy::default().minimum
}

fn default_incompatible_library_version() -> Version {
    UpgradePolicy::default().incompatible_future
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            libraries: Libraries::default(),
            debug_logging: false,
            http_timeout_secs: default_http_timeout(),
            update_check_timeout_secs: default_update_check_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_log_size_bytes: default_max_log_size_bytes(),
            minimum_library_version: default_minimum_library_version(),
            incompatible_library_version: default_incompatible_library_version(),
            github_api_base: None,
        }
    }
}

/// Why stored settings could not be used. Callers fall back to defaults.
#[derive(Debug, Error)]
pub enum SettingsLoadError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error("failed to read settings from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {} is not valid: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AppSettings {
    /// Load settings from the platform config directory.
    ///
    /// Always yields usable settings; the error, if any, says why defaults
    /// were substituted. A missing file is not an error.
    pub fn load() -> (Self, Option<SettingsLoadError>) {
        match AppPaths::new() {
            Ok(paths) => Self::load_from_path(&paths.settings_file()),
            Err(error) => (Self::default(), Some(error.into())),
        }
    }

    pub fn load_from_path(path: &Path) -> (Self, Option<SettingsLoadError>) {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return (Self::default(), None);
            }
            Err(source) => {
                return (
                    Self::default(),
                    Some(SettingsLoadError::Read {
                        path: path.to_path_buf(),
                        source,
                    }),
                );
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => (settings, None),
            Err(source) => (
                Self::default(),
                Some(SettingsLoadError::Parse {
                    path: path.to_path_buf(),
                    source,
                }),
            ),
        }
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        let paths = AppPaths::new().map_err(std::io::Error::other)?;
        paths.ensure_dirs()?;
        self.save_to_path(&paths.settings_file())
    }

    /// Write settings as pretty JSON, replacing `path` atomically.
    pub fn save_to_path(&self, path: &Path) -> Result<(), std::io::Error> {
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "settings path has no parent",
            )
        })?;
        std::fs::create_dir_all(parent)?;

        let content = serde_json::to_vec_pretty(self)?;
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(&content)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|error| error.error)?;
        Ok(())
    }

    pub fn policy(&self) -> UpgradePolicy {
        UpgradePolicy {
            minimum: self.minimum_library_version,
            incompatible_future: self.incompatible_library_version,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn update_check_timeout(&self) -> Duration {
        Duration::from_secs(self.update_check_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
