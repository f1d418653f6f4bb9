//! One throttled pass over every tracked service.
//!
//! A cycle snapshots the display, resolves each service in order, then either
//! reports what it found or installs it. It always restamps the status file
//! and ends by rebooting (after at least one install) or by restoring the
//! display. Nothing raised inside a cycle escapes it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use fleetup_backend::{
    DisplayState, Face, Rebooter, ReleaseRegistry, StatusDisplay, SystemControl, TrackedService,
    VersionInfo,
};
use futures_util::FutureExt;
use log::{debug, error, info, warn};

use crate::install::ArtifactInstaller;
use crate::local_version::detect_local_version;
use crate::resolve::ReleaseResolver;
use crate::status_file::StatusFile;

/// Settings the cycle runs with.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Minimum hours between two cycles. `None` disables updates entirely.
    pub interval_hours: Option<u64>,
    pub auto_install: bool,
    pub services: Vec<TrackedService>,
    pub scratch_dir: PathBuf,
    pub architecture: String,
}

#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ReleaseRegistry>,
    pub system: Arc<dyn SystemControl>,
    pub display: Arc<dyn StatusDisplay>,
    pub rebooter: Arc<dyn Rebooter>,
}

pub enum Activation {
    Ready(UpdateCycle),
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Services with an installable newer release, in check order.
    pub available: Vec<VersionInfo>,
    pub installed: usize,
    pub failed: usize,
    /// Services that could not be resolved this time.
    pub skipped: usize,
    /// Notification left on screen instead of the previous state.
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The previous cycle is still inside the interval.
    Throttled,
    Completed(CycleReport),
    /// At least one install succeeded and the host was asked to restart.
    Rebooting(CycleReport),
}

pub struct UpdateCycle {
    interval_hours: u64,
    auto_install: bool,
    services: Vec<TrackedService>,
    scratch_dir: PathBuf,
    architecture: String,
    status: StatusFile,
    collaborators: Collaborators,
}

impl UpdateCycle {
    /// Build the cycle, or report it disabled when no interval is configured.
    #[must_use]
    pub fn activate(
        config: UpdateConfig,
        status: StatusFile,
        collaborators: Collaborators,
    ) -> Activation {
        let Some(interval_hours) = config.interval_hours else {
            warn!("[update] no interval configured, update checks are disabled");
            return Activation::Disabled;
        };

        info!(
            "[update] ready: interval={interval_hours}h install={} arch={}",
            config.auto_install, config.architecture
        );
        Activation::Ready(Self {
            interval_hours,
            auto_install: config.auto_install,
            services: config.services,
            scratch_dir: config.scratch_dir,
            architecture: config.architecture,
            status,
            collaborators,
        })
    }

    #[must_use]
    pub fn status(&self) -> &StatusFile {
        &self.status
    }

    /// Run one cycle to completion.
    pub async fn run(&mut self) -> CycleOutcome {
        if self.status.is_recent_within_hours(self.interval_hours) {
            debug!(
                "[update] last check happened less than {} hours ago",
                self.interval_hours
            );
            return CycleOutcome::Throttled;
        }

        info!("[update] checking for updates ...");
        let display = Arc::clone(&self.collaborators.display);
        let previous = display.current();
        display.show("Checking for updates ...", checking_face());

        let report = match AssertUnwindSafe(self.check()).catch_unwind().await {
            Ok(report) => report,
            Err(panic) => {
                error!(
                    "[update] update check aborted: {}",
                    panic_message(panic.as_ref())
                );
                CycleReport::default()
            }
        };
        info!("[update] done");

        if let Err(error) = self.status.update(None) {
            error!("[update] failed to record check time: {error}");
        }

        if report.installed > 0 {
            display.show("Installed! Rebooting ...", Face::Friend);
            self.collaborators.rebooter.reboot();
            return CycleOutcome::Rebooting(report);
        }

        let restored = match &report.summary {
            Some(summary) => DisplayState::new(summary.as_str(), Face::Motivated),
            None => previous.or_defaults(),
        };
        display.update(restored);
        CycleOutcome::Completed(report)
    }

    async fn check(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let resolver = ReleaseResolver::new(
            self.collaborators.registry.as_ref(),
            self.architecture.as_str(),
        );

        for service in &self.services {
            let resolved = match detect_local_version(
                self.collaborators.system.as_ref(),
                service,
            )
            .await
            {
                Ok(current) => resolver.resolve_service(service, &current).await,
                Err(error) => Err(error),
            };

            match resolved {
                Ok(update) if update.has_update() => {
                    warn!(
                        "[update] update for {} available (local version is '{}'): {}",
                        update.repository,
                        update.current_version,
                        update.download_url.as_deref().unwrap_or_default()
                    );
                    report.available.push(update);
                }
                Ok(update) => {
                    debug!(
                        "[update] {} is up to date ({})",
                        update.repository, update.current_version
                    );
                }
                Err(error) => {
                    error!("[update] skipping {}: {error}", service.repository);
                    report.skipped += 1;
                }
            }
        }

        if report.available.is_empty() {
            return report;
        }

        if !self.auto_install {
            report.summary = Some(summary_text(report.available.len()));
            return report;
        }

        let installer = ArtifactInstaller::new(
            self.collaborators.registry.as_ref(),
            self.collaborators.system.as_ref(),
            self.collaborators.display.as_ref(),
            self.scratch_dir.as_path(),
        );
        for update in &report.available {
            let attempt = AssertUnwindSafe(installer.install(update))
                .catch_unwind()
                .await;
            match attempt {
                Ok(Ok(())) => {
                    info!("[update] installed {} {}", update.repository, update.available_version);
                    report.installed += 1;
                }
                Ok(Err(error)) => {
                    error!("[update] failed to install {}: {error}", update.repository);
                    report.failed += 1;
                }
                Err(panic) => {
                    error!(
                        "[update] install of {} aborted: {}",
                        update.repository,
                        panic_message(panic.as_ref())
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

fn summary_text(count: usize) -> String {
    if count == 1 {
        "1 new update available!".to_string()
    } else {
        format!("{count} new updates available!")
    }
}

fn checking_face() -> Face {
    if chrono::Local::now().timestamp() % 2 == 0 {
        Face::LookLeft
    } else {
        Face::LookRight
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
