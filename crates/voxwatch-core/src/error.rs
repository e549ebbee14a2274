//! Error types for voxwatch operations.
//!
//! This module defines [`VoxError`], the error enum shared by every voxwatch
//! crate. Only a listener bind failure is fatal; everything else is logged and
//! recovered where it happens so telemetry keeps flowing.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`VoxError`].
pub type Result<T> = std::result::Result<T, VoxError>;

/// Error type for all voxwatch operations.
#[derive(Debug, Error)]
pub enum VoxError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Listener Errors
    // =========================================================================
    /// A telemetry socket could not be bound at startup
    #[error("Failed to bind {transport} listener on {addr}")]
    ListenerBind {
        transport: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Speech Errors
    // =========================================================================
    /// No text-to-speech backend could be resolved
    #[error("No text-to-speech backend found (searched: {searched})")]
    BackendNotFound { searched: String },

    /// The speech process could not be started
    #[error("Failed to start speech backend {backend}: {message}")]
    SpeechSpawn { backend: String, message: String },

    // =========================================================================
    // Service Errors
    // =========================================================================
    /// The alert service has stopped and no longer accepts commands
    #[error("Alert service is not running")]
    ServiceStopped,

    /// Internal error (bug in voxwatch)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl VoxError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigValidation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a listener bind error
    pub fn listener_bind(transport: &'static str, addr: SocketAddr, source: std::io::Error) -> Self {
        Self::ListenerBind {
            transport,
            addr,
            source,
        }
    }

    /// Create a speech spawn error
    pub fn speech_spawn(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpeechSpawn {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error should stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ListenerBind { .. } | Self::Internal { .. })
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the operator
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("Create ~/.voxwatch/config.yaml or pass --config"),
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in the configuration file"),
            Self::ListenerBind { .. } => {
                Some("Another process may own the port - choose another with --port")
            }
            Self::BackendNotFound { .. } => {
                Some("Install espeak-ng for voice alerts (e.g. 'sudo apt-get install espeak-ng')")
            }
            Self::SpeechSpawn { .. } => Some("Check that the speech backend runs from a shell"),
            _ => None,
        }
    }
}
