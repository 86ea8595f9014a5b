use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort an installation run.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no package path or installation path is defined")]
    NoInstallLocation,

    #[error("package payload could not be located")]
    PayloadNotFound,

    #[error("destination {destination} is inside the payload {payload}")]
    DestinationInsidePayload {
        payload: PathBuf,
        destination: PathBuf,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk payload at {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("failed to create packages directory {path}: {source}")]
    CreatePackagesDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write package file {path}: {source}")]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize package file: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("installation cancelled after {completed} configuration(s)")]
    Cancelled { completed: usize },
}

/// Reasons an existing package file is ignored in favour of a fresh one.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
