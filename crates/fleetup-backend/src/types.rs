use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of resolving one tracked service against the release registry.
///
/// `download_url` is only set when the remote version is newer than the local
/// one and, for native services, an asset matching the host architecture was
/// found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub repository: String,
    pub current_version: String,
    pub available_version: String,
    pub download_url: Option<String>,
    pub is_native_binary: bool,
    pub architecture: String,
    pub service_name: String,
}

impl VersionInfo {
    /// Repository name without the owner, which is also the name of the
    /// executable or source directory inside the release archive.
    #[must_use]
    pub fn name(&self) -> &str {
        self.repository
            .split_once('/')
            .map_or(self.repository.as_str(), |(_, name)| name)
    }

    #[must_use]
    pub fn has_update(&self) -> bool {
        self.download_url.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub browser_download_url: String,
}

impl GitHubAsset {
    /// File name of the asset, taken from the last segment of its download URL.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.browser_download_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.browser_download_url)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    #[must_use]
    pub fn version(&self) -> &str {
        self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name)
    }
}

/// One service kept up to date by the update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedService {
    /// Registry repository, `owner/name`.
    pub repository: String,
    /// Program and arguments that print the installed version.
    pub version_command: Vec<String>,
    /// Whitespace separated token of the command output holding the version.
    #[serde(default)]
    pub version_token: usize,
    pub native: bool,
    pub service_name: String,
}

impl TrackedService {
    #[must_use]
    pub fn new(
        repository: &str,
        version_command: &[&str],
        version_token: usize,
        native: bool,
        service_name: &str,
    ) -> Self {
        Self {
            repository: repository.to_string(),
            version_command: version_command.iter().map(|s| (*s).to_string()).collect(),
            version_token,
            native,
            service_name: service_name.to_string(),
        }
    }

    /// Engine, mesh daemon and host application, in the order they are
    /// checked and installed.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "bettercap/bettercap",
                &["bettercap", "-version"],
                1,
                true,
                "bettercap",
            ),
            Self::new(
                "evilsocket/pwngrid",
                &["pwngrid", "-version"],
                0,
                true,
                "pwngrid-peer",
            ),
            Self::new(
                "evilsocket/pwnagotchi",
                &["pwnagotchi", "--version"],
                0,
                false,
                "pwnagotchi",
            ),
        ]
    }
}

/// Mood indicator shown next to the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    Awake,
    LookLeft,
    LookRight,
    Motivated,
    Excited,
    Smart,
    Intense,
    Friend,
}

impl Face {
    pub const DEFAULT: Self = Self::Awake;

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Awake => "awake",
            Self::LookLeft => "look_left",
            Self::LookRight => "look_right",
            Self::Motivated => "motivated",
            Self::Excited => "excited",
            Self::Smart => "smart",
            Self::Intense => "intense",
            Self::Friend => "friend",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "awake" => Some(Self::Awake),
            "look_left" => Some(Self::LookLeft),
            "look_right" => Some(Self::LookRight),
            "motivated" => Some(Self::Motivated),
            "excited" => Some(Self::Excited),
            "smart" => Some(Self::Smart),
            "intense" => Some(Self::Intense),
            "friend" => Some(Self::Friend),
            _ => None,
        }
    }

    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Awake => "(◕‿‿◕)",
            Self::LookLeft => "(☉_☉ )",
            Self::LookRight => "( ⚆_⚆)",
            Self::Motivated => "(☼‿‿☼)",
            Self::Excited => "(ᵔ◡◡ᵔ)",
            Self::Smart => "(✜‿‿✜)",
            Self::Intense => "(°▃▃°)",
            Self::Friend => "(♥‿‿♥)",
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status line and face currently on screen. `None` means the element has
/// never been set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub status: Option<String>,
    pub face: Option<Face>,
}

impl DisplayState {
    #[must_use]
    pub fn new(status: impl Into<String>, face: Face) -> Self {
        Self {
            status: Some(status.into()),
            face: Some(face),
        }
    }

    /// Fill unset elements with an empty status and the default face.
    #[must_use]
    pub fn or_defaults(self) -> Self {
        Self {
            status: Some(self.status.unwrap_or_default()),
            face: Some(self.face.unwrap_or(Face::DEFAULT)),
        }
    }
}
