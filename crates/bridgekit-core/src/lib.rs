pub mod kernel;
pub mod plugin_system;
pub mod storage;

// Re-export key public types for hosts and plugin crates
pub use kernel::{HostConfig, HostContext, KernelComponent};
pub use kernel::error::{Error, Result};
pub use plugin_system::{
    LoadMode, Platform, PlatformContext, PlatformType, PluginDescriptor, PluginLoader,
    PluginManager, PluginManifest, TransitionOutcome,
};
pub use storage::StorageProvider;

#[cfg(test)]
mod tests;
