use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::ConfigData;

/// Kind of platform a plugin turns out to be once its code is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlatformType {
    /// Not loaded yet, or shut down
    #[default]
    Unknown,
    /// Exposes a fixed set of accessories
    AccessoryPlatform,
    /// Discovers and registers devices at runtime
    DynamicPlatform,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::Unknown => "Unknown",
            PlatformType::AccessoryPlatform => "AccessoryPlatform",
            PlatformType::DynamicPlatform => "DynamicPlatform",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for platform callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    InitError(String),
    StartError(String),
    ConfigureError(String),
    ShutdownError(String),
    ExecutionError(String),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginError::InitError(msg) => write!(f, "Platform initialization error: {}", msg),
            PluginError::StartError(msg) => write!(f, "Platform start error: {}", msg),
            PluginError::ConfigureError(msg) => write!(f, "Platform configure error: {}", msg),
            PluginError::ShutdownError(msg) => write!(f, "Platform shutdown error: {}", msg),
            PluginError::ExecutionError(msg) => write!(f, "Platform execution error: {}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

/// What a platform constructor receives
#[derive(Debug, Clone)]
pub struct PlatformContext {
    /// Registry name of the plugin
    pub name: String,
    /// Absolute path of the plugin's manifest
    pub manifest_path: PathBuf,
    /// Config snapshot taken for this load
    pub config: ConfigData,
}

/// The live object obtained by loading a plugin's entry point.
///
/// The protocol layer drives devices through it; the host only calls the
/// lifecycle callbacks below and reads the device counters.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Kind of platform, known once the instance exists
    fn platform_type(&self) -> PlatformType;

    async fn on_start(&self, reason: &str) -> Result<(), PluginError>;

    async fn on_configure(&self) -> Result<(), PluginError>;

    async fn on_shutdown(&self, reason: &str, remove_devices: bool) -> Result<(), PluginError>;

    /// Devices registered with the protocol layer
    fn registered_devices(&self) -> usize {
        0
    }

    /// Devices added by the platform, registered or not
    fn added_devices(&self) -> usize {
        0
    }
}
