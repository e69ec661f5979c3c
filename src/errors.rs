// SPDX-License-Identifier: MPL-2.0

//! Error types for the streamer

use crate::pipeline::StageKind;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level application error
#[derive(Debug, Clone)]
pub enum AppError {
    /// Pipeline could not be built or started
    Build(BuildError),
    /// Configuration file errors
    Config(ConfigError),
    /// HTTP control plane could not be started
    Http(String),
    /// Generic error with message
    Other(String),
}

/// Errors raised while creating, configuring or driving a single stage
#[derive(Debug, Clone)]
pub enum StageError {
    /// Every candidate implementation failed to instantiate
    NoCandidate {
        kind: StageKind,
        tried: Vec<String>,
    },
    /// A specific implementation could not be instantiated
    Instantiate {
        implementation: String,
        message: String,
    },
    /// A stage for this role is not part of the pipeline
    Missing(StageKind),
    /// A property could not be applied
    Property {
        kind: StageKind,
        property: String,
        message: String,
    },
    /// Two adjacent stages refused to link
    Link { from: StageKind, to: StageKind },
    /// A data tap could not be attached
    Tap { kind: StageKind, message: String },
    /// The pipeline refused a state change
    State(String),
    /// A bounded wait expired
    Timeout(String),
}

/// Errors raised by the pipeline builder
#[derive(Debug, Clone)]
pub enum BuildError {
    /// The backend could not create an empty pipeline
    Backend(String),
    /// A stage could not be created or configured
    Stage(StageError),
    /// Linking failed with both the configured and the fallback format
    Link(StageError),
    /// The assembled pipeline refused to start
    Start(StageError),
}

/// Configuration persistence errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// File could not be read or written
    Io(String),
    /// File content is not a JSON object
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Build(e) => write!(f, "Pipeline error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Http(msg) => write!(f, "HTTP server error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::NoCandidate { kind, tried } => write!(
                f,
                "No {} implementation available (tried: {})",
                kind,
                tried.join(", ")
            ),
            StageError::Instantiate {
                implementation,
                message,
            } => write!(f, "Failed to create {}: {}", implementation, message),
            StageError::Missing(kind) => write!(f, "No {} stage in pipeline", kind),
            StageError::Property {
                kind,
                property,
                message,
            } => write!(f, "Failed to set {}.{}: {}", kind, property, message),
            StageError::Link { from, to } => write!(f, "Failed to link {} to {}", from, to),
            StageError::Tap { kind, message } => {
                write!(f, "Failed to attach tap on {}: {}", kind, message)
            }
            StageError::State(msg) => write!(f, "State change failed: {}", msg),
            StageError::Timeout(msg) => write!(f, "Timed out: {}", msg),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Backend(msg) => write!(f, "Backend error: {}", msg),
            BuildError::Stage(e) => write!(f, "{}", e),
            BuildError::Link(e) => write!(f, "{} (fallback format also failed)", e),
            BuildError::Start(e) => write!(f, "Failed to start pipeline: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for StageError {}
impl std::error::Error for BuildError {}
impl std::error::Error for ConfigError {}

impl From<BuildError> for AppError {
    fn from(err: BuildError) -> Self {
        AppError::Build(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<StageError> for BuildError {
    fn from(err: StageError) -> Self {
        BuildError::Stage(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}
