use std::path::PathBuf;
use thiserror::Error;

const APP_DIR_NAME: &str = "grimoire";
const LIBRARY_ROOT_NAME: &str = "Grimoire";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub library_root: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/data directory) cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
        let library_root = dirs::document_dir()
            .unwrap_or_else(|| home.clone())
            .join(LIBRARY_ROOT_NAME);

        #[cfg(target_os = "macos")]
        {
            Ok(Self {
                config_dir: home.join("Library/Application Support").join(APP_DIR_NAME),
                data_dir: home.join("Library/Application Support").join(APP_DIR_NAME),
                library_root,
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(APP_DIR_NAME),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(APP_DIR_NAME),
                library_root,
            })
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Root directory under which the built-in libraries live by default.
    #[must_use]
    pub fn default_library_root(&self) -> PathBuf {
        self.library_root.clone()
    }

    /// Ensure the configuration and data directories exist on disk.
    ///
    /// Library directories are created lazily by the first download.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Default library root, falling back to a relative directory when the
/// platform directories cannot be resolved.
#[must_use]
pub fn default_library_root() -> PathBuf {
    AppPaths::new().map_or_else(
        |_| PathBuf::from(LIBRARY_ROOT_NAME),
        |paths| paths.default_library_root(),
    )
}
