use std::path::PathBuf;

use thiserror::Error;

/// Resolving a service against the registry failed. Scoped to one service:
/// the cycle logs it and moves on to the next one.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("release registry request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("release registry answered HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("failed to parse release registry response: {0}")]
    Parse(#[source] reqwest::Error),

    #[error("not a valid version: {value:?}")]
    InvalidVersion { value: String },

    #[error("could not detect installed version of {program}: {details}")]
    LocalVersion { program: String, details: String },
}

impl ResolutionError {
    pub fn local_version(program: impl Into<String>, details: impl Into<String>) -> Self {
        Self::LocalVersion {
            program: program.into(),
            details: details.into(),
        }
    }
}

/// Why an artifact was refused before installation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("native update without SHA256 checksum file")]
    MissingChecksum,

    #[error("checksum file {} carries no digest", path.display())]
    MalformedChecksum { path: PathBuf },

    #[error("checksum mismatch for {}: expected={expected} got={actual}", path.display())]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to hash {}: {details}", path.display())]
    Unreadable { path: PathBuf, details: String },
}

/// Installing one service failed. Never escapes the service boundary.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationFailure),

    #[error("installation failed during {phase}: {details}")]
    Installation {
        phase: &'static str,
        details: String,
    },

    #[error("{context}: {details}")]
    Download {
        context: &'static str,
        details: String,
    },

    #[error("{context}: {details}")]
    Archive {
        context: &'static str,
        details: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    pub fn installation(phase: &'static str, details: impl Into<String>) -> Self {
        Self::Installation {
            phase,
            details: details.into(),
        }
    }

    pub fn download<E>(context: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Download {
            context,
            details: error.to_string(),
        }
    }

    pub fn archive<E>(context: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Archive {
            context,
            details: error.to_string(),
        }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn io_with_path(
        context: &'static str,
        path: &std::path::Path,
        source: &std::io::Error,
    ) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    #[must_use]
    pub fn is_verification(&self) -> bool {
        matches!(self, Self::Verification(_))
    }
}
