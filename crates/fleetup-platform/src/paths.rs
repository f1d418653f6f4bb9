use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build the updater's paths from the XDG base directories of the user the
    /// daemon runs as (root on the device).
    ///
    /// # Errors
    /// Returns an error when a required base directory cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        Ok(Self {
            config_dir: dirs::config_dir()
                .ok_or(AppPathsError::ConfigDirUnavailable)?
                .join("fleetup"),
            data_dir: dirs::data_dir()
                .ok_or(AppPathsError::DataDirUnavailable)?
                .join("fleetup"),
        })
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Throttle record shared by every update cycle.
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.data_dir.join("auto-update")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("update.log")
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("update.lock")
    }

    /// Root of the per-service scratch workspaces.
    #[must_use]
    pub fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join("updates")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
