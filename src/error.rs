//! Error handling for capsup.
use std::path::PathBuf;

use thiserror::Error;

use crate::constants::exit_codes;

/// Defines all errors that can abort the capture supervisor.
///
/// Failures that happen while units are already being supervised (unexpected exits,
/// failed restarts, stop and close errors) are logged where they occur and never
/// surface as a `CaptureError`.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Error reading or accessing the configuration file.
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        /// Path that could not be read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// The configuration references an environment variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The configuration parsed but is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured capture tool does not exist on disk.
    #[error("Capture binary not found at {0}")]
    CaptureToolMissing(PathBuf),

    /// The output directory could not be created.
    #[error("Failed to create output dir {path}: {source}")]
    OutputDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error opening the diagnostic sink or spawning the capture process for a unit.
    #[error("Failed to start capture for '{unit}': {source}")]
    SpawnFailed {
        /// The interface whose capture could not be started.
        unit: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The termination signal handler could not be installed.
    #[error("Failed to install signal handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),
}

impl CaptureError {
    /// Process exit status reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CaptureError::ConfigRead { .. }
            | CaptureError::ConfigParse(_)
            | CaptureError::MissingEnvVar(_)
            | CaptureError::InvalidConfig(_) => exit_codes::CONFIG_ERROR,
            CaptureError::CaptureToolMissing(_) | CaptureError::OutputDir { .. } => {
                exit_codes::ENVIRONMENT_ERROR
            }
            CaptureError::SpawnFailed { .. } | CaptureError::SignalHandler(_) => {
                exit_codes::STARTUP_ERROR
            }
        }
    }
}
