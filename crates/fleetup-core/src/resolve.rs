use std::path::Path;

use async_trait::async_trait;
use fleetup_backend::{
    GitHubAsset, GitHubRelease, InstallError, ReleaseRegistry, ResolutionError, TrackedService,
    VersionInfo,
};
use log::{debug, info};
use semver::Version;
use tokio::io::AsyncWriteExt;

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_WEB: &str = "https://github.com";

/// [`ReleaseRegistry`] backed by the GitHub releases API.
#[derive(Clone)]
pub struct GitHubRegistry {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubRegistry {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: GITHUB_API.to_string(),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl ReleaseRegistry for GitHubRegistry {
    async fn latest_release(&self, repository: &str) -> Result<GitHubRelease, ResolutionError> {
        let url = format!("{}/repos/{repository}/releases/latest", self.api_base);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", concat!("fleetup/", env!("CARGO_PKG_VERSION")))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(ResolutionError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(ResolutionError::HttpStatus {
                status,
                body_snippet,
            });
        }

        response.json().await.map_err(ResolutionError::Parse)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, InstallError> {
        use futures_util::StreamExt;

        let response = self
            .client
            .get(url)
            .header("User-Agent", concat!("fleetup/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|error| InstallError::download("download request failed", error))?;

        if !response.status().is_success() {
            return Err(InstallError::download(
                "download failed",
                format!("HTTP {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
            InstallError::io_with_path("failed to create download file", dest, &error)
        })?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|error| InstallError::download("download stream error", error))?;
            file.write_all(&chunk).await.map_err(|error| {
                InstallError::io_with_path("failed to write download data", dest, &error)
            })?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|error| {
            InstallError::io_with_path("failed to flush download file", dest, &error)
        })?;

        debug!("[update] download complete: {downloaded} bytes");
        Ok(downloaded)
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

/// Compares installed versions with the registry's latest releases.
pub struct ReleaseResolver<'a> {
    registry: &'a dyn ReleaseRegistry,
    architecture: String,
}

impl<'a> ReleaseResolver<'a> {
    pub fn new(registry: &'a dyn ReleaseRegistry, architecture: impl Into<String>) -> Self {
        Self {
            registry,
            architecture: architecture.into(),
        }
    }

    /// Resolve `repository` against the registry with one request.
    ///
    /// # Errors
    /// Returns an error when the registry cannot be reached, answers with an
    /// unusable response, or either version is not a version at all. A missing
    /// compatible asset is not an error.
    pub async fn resolve(
        &self,
        current_version: &str,
        repository: &str,
        native: bool,
    ) -> Result<VersionInfo, ResolutionError> {
        debug!("[update] checking remote version for {repository}, local is {current_version}");
        let release = self.registry.latest_release(repository).await?;
        version_info_from_release(
            &release,
            current_version,
            repository,
            native,
            &self.architecture,
        )
    }

    /// [`Self::resolve`] for a tracked service, tagging the result with the
    /// service unit to restart.
    ///
    /// # Errors
    /// See [`Self::resolve`].
    pub async fn resolve_service(
        &self,
        service: &TrackedService,
        current_version: &str,
    ) -> Result<VersionInfo, ResolutionError> {
        let mut info = self
            .resolve(current_version, &service.repository, service.native)
            .await?;
        info.service_name.clone_from(&service.service_name);
        Ok(info)
    }
}

fn version_info_from_release(
    release: &GitHubRelease,
    current_version: &str,
    repository: &str,
    native: bool,
    architecture: &str,
) -> Result<VersionInfo, ResolutionError> {
    let available = release.version();
    let current = current_version.strip_prefix('v').unwrap_or(current_version);

    let remote = parse_semver(available).ok_or_else(|| ResolutionError::InvalidVersion {
        value: release.tag_name.clone(),
    })?;
    let local = parse_semver(current).ok_or_else(|| ResolutionError::InvalidVersion {
        value: current.to_string(),
    })?;

    let download_url = if remote > local {
        if native {
            let asset = select_asset(&release.assets, architecture);
            if asset.is_none() {
                info!(
                    "[update] {repository} {available} has no zip asset for {architecture}, skipping"
                );
            }
            asset.map(|asset| asset.browser_download_url.clone())
        } else {
            Some(format!(
                "{GITHUB_WEB}/{repository}/archive/{}.zip",
                release.tag_name
            ))
        }
    } else {
        None
    };

    Ok(VersionInfo {
        repository: repository.to_string(),
        current_version: current.to_string(),
        available_version: available.to_string(),
        download_url,
        is_native_binary: native,
        architecture: architecture.to_string(),
        service_name: String::new(),
    })
}

/// First zip asset, in listing order, built for `architecture`. ARM hosts
/// also accept the generic `armhf` build.
fn select_asset<'r>(assets: &'r [GitHubAsset], architecture: &str) -> Option<&'r GitHubAsset> {
    let is_arm = architecture.starts_with("arm");
    assets.iter().find(|asset| {
        let name = asset.file_name();
        name.ends_with(".zip") && (name.contains(architecture) || (is_arm && name.contains("armhf")))
    })
}

fn parse_semver(version: &str) -> Option<Version> {
    let version = version.trim();
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().and_then(|part| part.parse::<u64>().ok());
    let patch = parts.next().and_then(|part| part.parse::<u64>().ok());

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}
