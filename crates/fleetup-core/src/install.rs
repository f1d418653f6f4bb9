use std::io::Read;
use std::path::{Path, PathBuf};

use fleetup_backend::{
    Face, InstallError, ReleaseRegistry, StatusDisplay, SystemControl, VerificationFailure,
    VersionInfo,
};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

/// Downloads, verifies and installs one release artifact at a time.
pub struct ArtifactInstaller<'a> {
    registry: &'a dyn ReleaseRegistry,
    system: &'a dyn SystemControl,
    display: &'a dyn StatusDisplay,
    scratch_root: PathBuf,
}

impl<'a> ArtifactInstaller<'a> {
    pub fn new(
        registry: &'a dyn ReleaseRegistry,
        system: &'a dyn SystemControl,
        display: &'a dyn StatusDisplay,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            system,
            display,
            scratch_root: scratch_root.into(),
        }
    }

    /// Install `update` into place.
    ///
    /// The per-service scratch workspace is wiped before the attempt and left
    /// behind afterwards.
    ///
    /// # Errors
    /// Returns an error when the download, extraction, checksum verification
    /// or the installation step itself fails.
    pub async fn install(&self, update: &VersionInfo) -> Result<(), InstallError> {
        let name = update.name();
        let version = update.available_version.as_str();
        let url = update
            .download_url
            .as_deref()
            .ok_or_else(|| InstallError::installation("prepare", "no download URL"))?;

        let workspace = prepare_workspace(&self.scratch_root, name)?;
        let archive = workspace.join(format!("{name}_{version}.zip"));

        info!("[update] downloading {url} to {} ...", archive.display());
        self.display
            .show(&format!("Downloading {name} {version} ..."), Face::Motivated);
        self.registry.download(url, &archive).await?;

        info!(
            "[update] extracting {} to {} ...",
            archive.display(),
            workspace.display()
        );
        self.display
            .show(&format!("Extracting {name} {version} ..."), Face::Excited);
        extract_zip(&archive, &workspace)?;

        let source_path = workspace.join(name);
        self.display
            .show(&format!("Verifying {name} {version} ..."), Face::Smart);
        verify(&workspace, &source_path, update.is_native_binary)?;

        info!("[update] installing {name} ...");
        self.display
            .show(&format!("Installing {name} {version} ..."), Face::Intense);
        if update.is_native_binary {
            self.install_native(update, &source_path).await
        } else {
            self.install_source(&workspace, name, version).await
        }
    }

    async fn install_native(
        &self,
        update: &VersionInfo,
        source_path: &Path,
    ) -> Result<(), InstallError> {
        let name = update.name();
        let dest_path = self.system.find_executable(name).ok_or_else(|| {
            InstallError::installation("locate", format!("can't find path for {name}"))
        })?;

        info!("[update] stopping {} ...", update.service_name);
        let stopped = self.system.stop_service(&update.service_name).await;
        if let Err(error) = &stopped {
            warn!("[update] failed to stop {}: {error}", update.service_name);
        }

        let moved = replace_file(source_path, &dest_path);
        if let Err(error) = &moved {
            warn!("[update] failed to move {name} into place: {error}");
        }

        info!("[update] restarting {} ...", update.service_name);
        let started = self.system.start_service(&update.service_name).await;
        if let Err(error) = &started {
            warn!("[update] failed to start {}: {error}", update.service_name);
        }

        stopped.map_err(|error| InstallError::installation("stop service", error.to_string()))?;
        moved?;
        started.map_err(|error| InstallError::installation("start service", error.to_string()))
    }

    async fn install_source(
        &self,
        workspace: &Path,
        name: &str,
        version: &str,
    ) -> Result<(), InstallError> {
        let mut source_dir = workspace.join(name);
        if !source_dir.exists() {
            source_dir = workspace.join(format!("{name}-{version}"));
        }
        if !source_dir.is_dir() {
            return Err(InstallError::installation(
                "locate",
                format!("no source directory for {name} {version}"),
            ));
        }

        self.system
            .package_install(&source_dir)
            .await
            .map_err(|error| InstallError::installation("package install", error.to_string()))
    }
}

/// Create an empty scratch directory for `name`. Leftovers from earlier
/// attempts are removed best-effort.
fn prepare_workspace(root: &Path, name: &str) -> Result<PathBuf, InstallError> {
    let path = root.join(name);
    if path.exists() {
        debug!("[update] deleting {}", path.display());
        if let Err(error) = std::fs::remove_dir_all(&path) {
            debug!("[update] ignoring cleanup failure for {}: {error}", path.display());
        }
    }
    std::fs::create_dir_all(&path).map_err(|error| {
        InstallError::io_with_path("failed to create scratch directory", &path, &error)
    })?;
    Ok(path)
}

/// Check the artifact against the first `*.sha256` file in `workspace`.
/// Native artifacts must carry one; source artifacts may go unchecked.
fn verify(workspace: &Path, source_path: &Path, native: bool) -> Result<(), VerificationFailure> {
    let Some(checksum_path) = find_checksum_file(workspace) else {
        if native {
            warn!("[update] native update without SHA256 checksum file");
            return Err(VerificationFailure::MissingChecksum);
        }
        debug!("[update] no checksum shipped with source update, skipping verification");
        return Ok(());
    };

    info!(
        "[update] verifying {} for {} ...",
        checksum_path.display(),
        source_path.display()
    );

    let contents =
        std::fs::read_to_string(&checksum_path).map_err(|error| VerificationFailure::Unreadable {
            path: checksum_path.clone(),
            details: error.to_string(),
        })?;
    let expected = parse_expected_checksum(&contents).ok_or_else(|| {
        VerificationFailure::MalformedChecksum {
            path: checksum_path.clone(),
        }
    })?;
    let actual = sha256_file(source_path).map_err(|error| VerificationFailure::Unreadable {
        path: source_path.to_path_buf(),
        details: error.to_string(),
    })?;

    if actual.eq_ignore_ascii_case(&expected) {
        Ok(())
    } else {
        warn!(
            "[update] checksum mismatch for {}: expected={expected} got={actual}",
            source_path.display()
        );
        Err(VerificationFailure::Mismatch {
            path: source_path.to_path_buf(),
            expected,
            actual,
        })
    }
}

fn find_checksum_file(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("sha256"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Digest after the first `=` of a checksum file, e.g.
/// `SHA256(bettercap)= 1f2e...`.
fn parse_expected_checksum(contents: &str) -> Option<String> {
    let (_, digest) = contents.split_once('=')?;
    let digest = digest.trim();
    if digest.is_empty() {
        None
    } else {
        Some(digest.to_ascii_lowercase())
    }
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), InstallError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        InstallError::io_with_path("failed to open zip file", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::archive("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::archive("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("[update] skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                InstallError::io_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                InstallError::io_with_path(
                    "failed to create extraction parent directory",
                    parent,
                    &error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            InstallError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            InstallError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("[update] extraction complete to {}", dest.display());
    Ok(())
}

/// Move `src` over `dest`. Falls back to copying next to `dest` and renaming
/// when the two live on different filesystems.
fn replace_file(src: &Path, dest: &Path) -> Result<(), InstallError> {
    if std::fs::rename(src, dest).is_err() {
        let file_name = dest
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("update");
        let staged = dest.with_file_name(format!(".{file_name}.fleetup-new"));

        std::fs::copy(src, &staged).map_err(|error| {
            InstallError::io_with_path("failed to stage new executable", &staged, &error)
        })?;
        if let Err(error) = std::fs::rename(&staged, dest) {
            let _ = std::fs::remove_file(&staged);
            return Err(InstallError::io_with_path(
                "failed to replace executable",
                dest,
                &error,
            ));
        }
        let _ = std::fs::remove_file(src);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755)).map_err(
            |error| InstallError::io_with_path("failed to mark executable", dest, &error),
        )?;
    }

    Ok(())
}
