//! # Bridgekit Core Plugin System Errors
//!
//! [`PluginSystemError`] covers the failures of the plugin system that are
//! reported to the caller as `Err`: a manifest whose name disagrees with its
//! registry entry, a platform library that cannot be opened, and FFI faults.
//! Failures of a plugin's own callbacks are not errors of the
//! host; they are captured as [`PluginError`](crate::plugin_system::PluginError)
//! into the descriptor instead.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Plugin loading failed for '{plugin_id}': {source}")]
    LoadingError {
        plugin_id: String,
        path: Option<PathBuf>,
        #[source]
        source: Box<PluginSystemErrorSource>,
    },

    #[error("FFI error in plugin '{plugin_id}' during operation '{operation}': {message}")]
    FfiError {
        plugin_id: String,
        operation: String,
        message: String,
    },

    #[error("Manifest '{path}' declares plugin '{found}', expected '{expected}'")]
    ManifestNameMismatch {
        expected: String,
        found: String,
        path: PathBuf,
    },

    #[error("Plugin callback '{operation}' failed for '{plugin_id}': {message}")]
    CallbackError {
        plugin_id: String,
        operation: String,
        message: String,
    },

    #[error("Plugin '{plugin_id}' did not finish '{operation}' within {timeout_ms} ms")]
    Timeout {
        plugin_id: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("Internal plugin system error: {0}")]
    InternalError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemErrorSource {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Other: {0}")]
    Other(String),
}
