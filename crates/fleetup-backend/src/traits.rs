use async_trait::async_trait;
use std::path::{Path, PathBuf};

use fleetup_platform::CommandError;

use crate::error::{InstallError, ResolutionError};
use crate::types::{DisplayState, Face, GitHubRelease};

/// Remote source of releases and their artifacts.
#[async_trait]
pub trait ReleaseRegistry: Send + Sync {
    /// Latest published release of `repository` (`owner/name`).
    async fn latest_release(&self, repository: &str) -> Result<GitHubRelease, ResolutionError>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, InstallError>;
}

/// Host process and service management.
#[async_trait]
pub trait SystemControl: Send + Sync {
    /// Location of `name` on `PATH`, if installed.
    fn find_executable(&self, name: &str) -> Option<PathBuf>;

    async fn stop_service(&self, service: &str) -> Result<(), CommandError>;

    async fn start_service(&self, service: &str) -> Result<(), CommandError>;

    /// Run the packaging tool's install command inside `dir`.
    async fn package_install(&self, dir: &Path) -> Result<(), CommandError>;

    /// Stdout of `program args...`.
    async fn command_output(&self, program: &str, args: &[String])
    -> Result<String, CommandError>;
}

/// Screen showing a status line and a face. Updates are fire-and-forget.
pub trait StatusDisplay: Send + Sync {
    fn update(&self, state: DisplayState);

    fn current(&self) -> DisplayState;

    fn show(&self, status: &str, face: Face) {
        self.update(DisplayState::new(status, face));
    }
}

pub trait Rebooter: Send + Sync {
    /// Restart the host. Production implementations end the process and never
    /// return.
    fn reboot(&self);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::{DisplayState, Face, StatusDisplay};

    #[derive(Default)]
    struct RecordingDisplay {
        updates: Mutex<Vec<DisplayState>>,
    }

    impl StatusDisplay for RecordingDisplay {
        fn update(&self, state: DisplayState) {
            self.updates
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(state);
        }

        fn current(&self) -> DisplayState {
            self.updates
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    #[test]
    fn show_forwards_status_and_face_to_update() {
        let display = RecordingDisplay::default();

        display.show("Checking for updates ...", Face::LookLeft);

        assert_eq!(
            display.current(),
            DisplayState::new("Checking for updates ...", Face::LookLeft)
        );
    }

    #[test]
    fn trait_object_starts_with_unset_state() {
        let display: Box<dyn StatusDisplay> = Box::new(RecordingDisplay::default());

        assert_eq!(display.current(), DisplayState::default());
    }
}
