use fleetup_backend::{ResolutionError, SystemControl, TrackedService};
use log::debug;

/// Ask the installed program of `service` for its version.
///
/// # Errors
/// Returns [`ResolutionError::LocalVersion`] when no version command is
/// configured, the command fails, or its output lacks the expected token.
pub async fn detect_local_version(
    system: &dyn SystemControl,
    service: &TrackedService,
) -> Result<String, ResolutionError> {
    let Some((program, args)) = service.version_command.split_first() else {
        return Err(ResolutionError::local_version(
            &service.repository,
            "no version command configured",
        ));
    };

    let output = system
        .command_output(program, args)
        .await
        .map_err(|error| ResolutionError::local_version(program, error.to_string()))?;

    let version = parse_version_output(&output, service.version_token).ok_or_else(|| {
        ResolutionError::local_version(
            program,
            format!(
                "output has no token #{}: {:?}",
                service.version_token,
                output.trim()
            ),
        )
    })?;

    debug!("[update] local version of {program} is {version}");
    Ok(version)
}

fn parse_version_output(output: &str, token: usize) -> Option<String> {
    let raw = output.split_whitespace().nth(token)?;
    let version = raw.strip_prefix('v').unwrap_or(raw);
    (!version.is_empty()).then(|| version.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use fleetup_backend::{CommandError, ResolutionError, SystemControl, TrackedService};

    use super::{detect_local_version, parse_version_output};

    struct FixedOutput(Result<&'static str, ()>);

    #[async_trait]
    impl SystemControl for FixedOutput {
        fn find_executable(&self, _name: &str) -> Option<PathBuf> {
            None
        }

        async fn stop_service(&self, _service: &str) -> Result<(), CommandError> {
            Ok(())
        }

        async fn start_service(&self, _service: &str) -> Result<(), CommandError> {
            Ok(())
        }

        async fn package_install(&self, _dir: &Path) -> Result<(), CommandError> {
            Ok(())
        }

        async fn command_output(
            &self,
            program: &str,
            _args: &[String],
        ) -> Result<String, CommandError> {
            self.0
                .map(str::to_string)
                .map_err(|()| CommandError::Failed {
                    program: program.to_string(),
                    code: Some(127),
                    stderr_snippet: String::new(),
                })
        }
    }

    #[test]
    fn parse_version_output_picks_token_and_strips_prefix() {
        assert_eq!(
            parse_version_output("bettercap v2.30.0\n", 1).as_deref(),
            Some("2.30.0")
        );
        assert_eq!(parse_version_output("v1.10.3", 0).as_deref(), Some("1.10.3"));
        assert!(parse_version_output("bettercap", 1).is_none());
        assert!(parse_version_output("v", 0).is_none());
    }

    #[tokio::test]
    async fn detects_version_from_configured_token() {
        let system = FixedOutput(Ok("bettercap v2.31.1 (built for linux arm)"));
        let service = TrackedService::defaults().remove(0);

        let version = detect_local_version(&system, &service)
            .await
            .expect("version should be detected");

        assert_eq!(version, "2.31.1");
    }

    #[tokio::test]
    async fn failing_command_is_scoped_local_version_error() {
        let system = FixedOutput(Err(()));
        let service = TrackedService::defaults().remove(1);

        let error = detect_local_version(&system, &service)
            .await
            .expect_err("missing program should fail");

        assert!(matches!(
            error,
            ResolutionError::LocalVersion { ref program, .. } if program == "pwngrid"
        ));
    }

    #[tokio::test]
    async fn empty_version_command_is_rejected() {
        let system = FixedOutput(Ok("1.0.0"));
        let service = TrackedService::new("owner/tool", &[], 0, true, "tool");

        assert!(detect_local_version(&system, &service).await.is_err());
    }
}
