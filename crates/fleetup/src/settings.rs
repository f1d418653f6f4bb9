use std::path::{Path, PathBuf};

use fleetup_backend::TrackedService;
use fleetup_core::UpdateConfig;
use fleetup_platform::{AppPaths, host_architecture};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Hours between update checks. Updates stay disabled while unset.
    #[serde(default)]
    pub interval: Option<u64>,

    #[serde(default)]
    pub install: bool,

    #[serde(default = "TrackedService::defaults")]
    pub services: Vec<TrackedService>,

    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub status_file: Option<PathBuf>,

    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: None,
            install: false,
            services: TrackedService::defaults(),
            scratch_dir: None,
            status_file: None,
            architecture: None,
            connect_timeout_secs: default_connect_timeout(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn status_file_path(&self, paths: &AppPaths) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| paths.status_file())
    }

    /// Cycle settings, with unset locations and the architecture filled in
    /// from the host.
    pub fn update_config(&self) -> UpdateConfig {
        UpdateConfig {
            interval_hours: self.interval,
            auto_install: self.install,
            services: self.services.clone(),
            scratch_dir: self
                .scratch_dir
                .clone()
                .unwrap_or_else(AppPaths::scratch_dir),
            architecture: self
                .architecture
                .clone()
                .unwrap_or_else(host_architecture),
        }
    }
}
