use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fleetup_backend::{CommandError, SystemControl};
use fleetup_platform::{run_checked, run_checked_in};
use log::{debug, info};
use which::which;

const SERVICE_PROGRAM: &str = "service";
const PACKAGE_PROGRAM: &str = "pip3";

/// [`SystemControl`] over SysV-style `service` commands and `pip3`.
#[derive(Debug, Clone)]
pub struct LinuxSystem {
    service_program: String,
    package_program: String,
}

impl Default for LinuxSystem {
    fn default() -> Self {
        Self {
            service_program: SERVICE_PROGRAM.to_string(),
            package_program: PACKAGE_PROGRAM.to_string(),
        }
    }
}

impl LinuxSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_service_program(mut self, program: impl Into<String>) -> Self {
        self.service_program = program.into();
        self
    }

    #[must_use]
    pub fn with_package_program(mut self, program: impl Into<String>) -> Self {
        self.package_program = program.into();
        self
    }

    async fn service(&self, service: &str, action: &str) -> Result<(), CommandError> {
        info!("[update] {action} {service}");
        run_checked(&self.service_program, &[service, action]).await?;
        Ok(())
    }
}

#[async_trait]
impl SystemControl for LinuxSystem {
    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        match which(name) {
            Ok(path) => Some(path),
            Err(error) => {
                debug!("[update] {name} not found on PATH: {error}");
                None
            }
        }
    }

    async fn stop_service(&self, service: &str) -> Result<(), CommandError> {
        self.service(service, "stop").await
    }

    async fn start_service(&self, service: &str) -> Result<(), CommandError> {
        self.service(service, "start").await
    }

    async fn package_install(&self, dir: &Path) -> Result<(), CommandError> {
        info!("[update] installing package from {}", dir.display());
        run_checked_in(Some(dir), &self.package_program, &["install", "."]).await?;
        Ok(())
    }

    async fn command_output(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<String, CommandError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_checked(program, &args).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use fleetup_backend::{CommandError, SystemControl};

    use super::LinuxSystem;

    #[test]
    fn find_executable_locates_shell() {
        let system = LinuxSystem::new();

        assert!(system.find_executable("sh").is_some());
        assert!(
            system
                .find_executable("fleetup-definitely-missing-binary")
                .is_none()
        );
    }

    #[tokio::test]
    async fn command_output_returns_stdout() {
        let system = LinuxSystem::new();

        let output = system
            .command_output("echo", &["bettercap".to_string(), "v2.32.0".to_string()])
            .await
            .expect("echo should succeed");

        assert_eq!(output.trim(), "bettercap v2.32.0");
    }

    #[tokio::test]
    async fn service_actions_run_the_configured_program() {
        let system = LinuxSystem::new().with_service_program("true");

        system
            .stop_service("pwngrid-peer")
            .await
            .expect("stop should succeed");
        system
            .start_service("pwngrid-peer")
            .await
            .expect("start should succeed");
    }

    #[tokio::test]
    async fn failing_service_program_is_reported() {
        let system = LinuxSystem::new().with_service_program("false");

        let error = system
            .stop_service("bettercap")
            .await
            .expect_err("false should fail");

        assert!(matches!(error, CommandError::Failed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn package_install_runs_inside_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let system = LinuxSystem::new().with_package_program("ls");
        std::fs::write(temp.path().join("setup.py"), b"").expect("setup.py should be written");

        system
            .package_install(temp.path())
            .await
            .expect("listing the directory should succeed");
    }
}
