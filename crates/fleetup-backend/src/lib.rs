//! Types and collaborator traits shared by the update pipeline.

mod error;
mod traits;
mod types;

pub use error::{InstallError, ResolutionError, VerificationFailure};
pub use fleetup_platform::CommandError;
pub use traits::{Rebooter, ReleaseRegistry, StatusDisplay, SystemControl};
pub use types::{DisplayState, Face, GitHubAsset, GitHubRelease, TrackedService, VersionInfo};
