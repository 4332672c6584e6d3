//! # Bridgekit Core Kernel Errors
//!
//! Defines the crate-wide [`Error`] type.
//!
//! Subsystems keep their own typed errors ([`PluginSystemError`],
//! [`StorageSystemError`]) and convert into [`Error`] with `?`. Only
//! environment-level failures travel through this type: "plugin not found",
//! "already in the desired state" and plugin callback failures are reported
//! through return values and descriptor state instead.
use std::path::PathBuf;
use std::result::Result as StdResult;

use crate::plugin_system::error::PluginSystemError;
use crate::storage::error::StorageSystemError;
use thiserror::Error as ThisError;

/// Crate-wide error type
#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// The host context was torn down; no further operations are accepted.
    #[error("Host context has been torn down")]
    ContextTornDown,

    /// Host configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("Kernel lifecycle error during {phase}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

/// Represents a specific phase in a component's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Initialize")]
    Initialize,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

// Helper to create an I/O error with context, wraps StorageSystemError::Io
impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::io(source, operation, path))
    }
}
