//! Update pipeline for the fleetup orchestrator.
//!
//! Everything here talks to the outside world through the collaborator traits
//! in `fleetup-backend`:
//! - [`ReleaseResolver`] decides whether a newer, compatible release exists.
//! - [`ArtifactInstaller`] downloads, verifies and installs it.
//! - [`UpdateCycle`] drives both for every tracked service, throttled by a
//!   [`StatusFile`].
//! - [`SharedView`] is the screen element table, guarded by a
//!   [`ReadBiasedLock`].

mod cycle;
mod install;
mod local_version;
mod resolve;
pub mod rwlock;
pub mod status_file;
mod view;

pub use cycle::{Activation, Collaborators, CycleOutcome, CycleReport, UpdateConfig, UpdateCycle};
pub use install::ArtifactInstaller;
pub use local_version::detect_local_version;
pub use resolve::{GitHubRegistry, ReleaseResolver};
pub use rwlock::{RawReadBiasedLock, ReadBiasedLock, ReadGuard, WriteGuard};
pub use status_file::{Json, PayloadFormat, RawText, StatusData, StatusFile, StatusFileError};
pub use view::{FACE_ELEMENT, STATUS_ELEMENT, SharedView};
