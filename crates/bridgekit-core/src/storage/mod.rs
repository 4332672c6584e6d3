//! # Bridgekit Core Storage
//!
//! Durable state for the host:
//!
//! - [`StorageProvider`] abstracts file access; [`LocalStorageProvider`] is the
//!   filesystem implementation and writes atomically.
//! - [`config`] reads host and per-plugin configuration files in JSON, YAML or
//!   TOML and snapshots plugin config schemas.
//! - [`registry_store`] persists the ordered plugin registry.
pub mod config;
pub mod error;
pub mod local;
pub mod provider;
pub mod registry_store;

pub use config::{ConfigData, ConfigFormat, PluginConfigManager};
pub use local::LocalStorageProvider;
pub use provider::StorageProvider;
pub use registry_store::{RegistryStore, StoredPlugin};
