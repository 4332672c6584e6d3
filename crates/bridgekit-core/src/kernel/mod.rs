//! # Bridgekit Core Kernel
//!
//! The `kernel` module holds the pieces every other subsystem leans on:
//!
//! - **Host context**: [`HostContext`](context::HostContext) is the explicitly
//!   constructed and explicitly torn down object that carries the host's paths,
//!   module search path, storage provider and transition timeout. It is threaded
//!   through the [`PluginManager`](crate::plugin_system::PluginManager)
//!   constructor instead of living in process-wide state.
//! - **Component lifecycle**: the [`KernelComponent`](component::KernelComponent)
//!   trait gives hosts a uniform initialize/start/stop surface.
//! - **Core constants**: file names, placeholders and defaults in `constants`.
//! - **Error handling**: the crate-wide [`Error`](error::Error) and `Result`
//!   alias in the `error` submodule.
pub mod component;
pub mod constants;
pub mod context;
pub mod error;

pub use component::KernelComponent;
pub use context::{HostConfig, HostContext, HostContextBuilder};
pub use error::{Error, Result};
