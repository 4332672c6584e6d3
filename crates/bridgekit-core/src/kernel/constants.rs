/// Application name
pub const APP_NAME: &str = "bridgekit";

/// Storage directory name, created under the user's home directory
pub const STORAGE_DIR_NAME: &str = ".bridgekit";

/// Per-plugin configuration directory, relative to the storage directory
pub const CONFIG_DIR_NAME: &str = "config";

/// Local plugins directory, relative to the working directory
pub const LOCAL_PLUGINS_DIR: &str = "plugins";

/// File name of a plugin (or host) manifest
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// File name of the persisted plugin registry
pub const REGISTRY_FILE_NAME: &str = "plugins.json";

/// Symbol exported by dynamic platform libraries
pub const PLATFORM_INIT_SYMBOL: &[u8] = b"_platform_init\0";

/// Default bound for start, configure and shutdown callbacks
pub const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 5_000;

/// Version shown for a descriptor whose manifest has not been parsed yet
pub const PLACEHOLDER_VERSION: &str = "1.0.0";

/// Description and author shown for a descriptor whose manifest has not been parsed yet
pub const PLACEHOLDER_TEXT: &str = "To update";

/// Description used when a manifest does not carry one
pub const DEFAULT_DESCRIPTION: &str = "No description";

/// Author used when a manifest does not carry one
pub const DEFAULT_AUTHOR: &str = "Unknown author";

/// Longest accepted package name
pub const MAX_PACKAGE_NAME_LEN: usize = 214;
