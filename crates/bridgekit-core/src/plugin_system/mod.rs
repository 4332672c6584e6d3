//! # Bridgekit Core Plugin System
//!
//! Everything between "a name or a path" and "a running platform instance".
//! The plugin system discovers plugin manifests, keeps the ordered registry of
//! known plugins, turns entry points into live platforms and drives each one
//! through its lifecycle independently of the others.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`resolver`]**: Locates a plugin's `manifest.json` from a bare package
//!   name, a path, or the empty identifier (the host's own manifest) without
//!   touching plugin code.
//! - **[`manifest`]**: Parses a manifest into a [`PluginManifest`] and folds its
//!   metadata into a descriptor.
//! - **[`descriptor`]**: The host-side record of one plugin
//!   ([`PluginDescriptor`]), its transition lock and the outcome types returned
//!   by lifecycle operations.
//! - **[`registry`]**: The ordered name-keyed collection ([`PluginRegistry`])
//!   pairing each descriptor with its platform instance.
//! - **[`loader`]**: Builds platform instances, either from constructors
//!   registered in-process or from dynamic libraries over the C ABI in [`ffi`].
//! - **[`manager`]**: The lifecycle controller ([`PluginManager`]): add, remove,
//!   enable, disable, load, start, configure, shutdown, persistence and batch
//!   supervision.
//! - **[`traits`]**: The [`Platform`] contract plugins implement.
//! - **[`error`]**: [`PluginSystemError`](error::PluginSystemError).
pub mod descriptor;
pub mod error;
pub mod ffi;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod traits;

pub use descriptor::{
    LoadMode, LockToken, Operation, PluginDescriptor, SkipReason, TransitionError,
    TransitionOutcome,
};
pub use loader::PluginLoader;
pub use manager::PluginManager;
pub use manifest::{ManifestBuilder, PluginManifest};
pub use registry::PluginRegistry;
pub use resolver::Resolver;
pub use traits::{Platform, PlatformContext, PlatformType, PluginError};

#[cfg(test)]
mod tests;
