//! Runs one update cycle. Meant to be started by the host whenever internet
//! connectivity becomes available.

mod logging;
mod settings;
mod single_instance;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use fleetup_core::{
    Activation, Collaborators, CycleOutcome, GitHubRegistry, SharedView, StatusFile, UpdateCycle,
};
use fleetup_platform::AppPaths;
use fleetup_system::{LinuxSystem, SystemRebooter};
use log::{error, info};

use crate::settings::Settings;
use crate::single_instance::{AcquireError, SingleInstance};

#[tokio::main]
async fn main() -> ExitCode {
    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("fleetup: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = paths.ensure_dirs() {
        eprintln!("fleetup: failed to create application directories: {error}");
        return ExitCode::FAILURE;
    }

    let loaded = Settings::load_from(&paths.settings_file());
    let log_settings = loaded.as_ref().map_or_else(|_| Settings::default(), Clone::clone);
    logging::init_logging(
        &paths.log_file(),
        log_settings.debug_logging,
        log_settings.max_log_size_bytes,
    );

    match loaded {
        Ok(settings) => run(&paths, &settings).await,
        Err(error) => {
            error!("[update] {error}; update checks stay disabled");
            ExitCode::FAILURE
        }
    }
}

async fn run(paths: &AppPaths, settings: &Settings) -> ExitCode {
    let _instance = match SingleInstance::acquire(&paths.lock_file()) {
        Ok(instance) => instance,
        Err(AcquireError::AlreadyRunning) => {
            info!("[update] another update cycle is in progress, skipping");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            error!("[update] {error}");
            return ExitCode::FAILURE;
        }
    };

    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            error!("[update] failed to build HTTP client: {error}");
            return ExitCode::FAILURE;
        }
    };

    let status = StatusFile::load(settings.status_file_path(paths));

    let collaborators = Collaborators {
        registry: Arc::new(GitHubRegistry::new(client)),
        system: Arc::new(LinuxSystem::new()),
        display: Arc::new(SharedView::new()),
        rebooter: Arc::new(SystemRebooter),
    };

    let mut cycle = match UpdateCycle::activate(settings.update_config(), status, collaborators) {
        Activation::Ready(cycle) => cycle,
        Activation::Disabled => return ExitCode::SUCCESS,
    };

    match cycle.run().await {
        CycleOutcome::Throttled => {}
        CycleOutcome::Completed(report) => info!(
            "[update] cycle finished: {} available, {} installed, {} failed, {} skipped",
            report.available.len(),
            report.installed,
            report.failed,
            report.skipped
        ),
        CycleOutcome::Rebooting(report) => {
            info!("[update] {} update(s) installed, rebooting", report.installed);
        }
    }

    ExitCode::SUCCESS
}
