//! Error handling module for snap
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every layer below `main` returns these; only `main` logs and exits.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for snap
#[derive(Error, Debug)]
pub enum SnapError {
    /// IO errors (file operations, staging archives, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No configuration file at the requested location
    #[error("Configuration does not exist ('{0}')")]
    ConfigNotFound(PathBuf),

    /// Configuration document parsed but failed validation
    #[error("Configuration at '{}' is not valid:\n{}", .path.display(), .errors.join("\n"))]
    InvalidConfig { path: PathBuf, errors: Vec<String> },

    /// General configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A runner required a property that neither the target nor the global map holds
    #[error("Missing property '{key}' in target {target_type}")]
    MissingProperty { key: String, target_type: String },

    /// No runner registered for a target type
    #[error("Could not find target runner for type '{target_type}' (target '{target}')")]
    UnknownRunner { target_type: String, target: String },

    /// Invalid verb combination or no verb at all
    #[error("{0}")]
    Usage(String),

    /// No running container matched the id or name fragment
    #[error("No container matches '{0}'")]
    ContainerNotFound(String),

    /// Several containers matched the id or name fragment
    #[error("Container reference '{fragment}' is ambiguous, matches: {}", .matches.join(", "))]
    AmbiguousContainer {
        fragment: String,
        matches: Vec<String>,
    },

    /// Container control failures (stop, start, copy)
    #[error("Container error: {0}")]
    Container(String),

    /// Tar creation or extraction failures
    #[error("Archive error: {0}")]
    Archive(String),

    /// External command could not be spawned or exited non-zero
    #[error("Command failed: {0}")]
    Command(String),

    /// HTTP transport failures talking to a backend
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend capture or restore failed for a target
    #[error("Backend operation failed for target '{target}' (artifact '{artifact}'): {message}")]
    Backend {
        target: String,
        artifact: String,
        message: String,
    },

    /// Operation the runner or bridge does not support
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias for snap operations
pub type Result<T> = std::result::Result<T, SnapError>;

// Convenient error constructors
impl SnapError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Create a container control error
    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a not-implemented error
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a missing property error
    pub fn missing_property(key: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::MissingProperty {
            key: key.into(),
            target_type: target_type.into(),
        }
    }

    /// Create a backend error for a target and artifact
    pub fn backend(
        target: impl Into<String>,
        artifact: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            target: target.into(),
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}
