use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::storage::config::ConfigFormat;
use crate::storage::error::StorageSystemError;
use crate::storage::{LocalStorageProvider, StorageProvider};

/// Host settings, usually read from a TOML/JSON/YAML file.
///
/// Every field has a default so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root of the persisted state (registry file, plugin configs)
    pub storage_dir: PathBuf,
    /// Per-plugin config directory; defaults to `<storage_dir>/config`
    pub config_dir: Option<PathBuf>,
    /// Base for relative plugin paths; defaults to the process working directory
    pub working_dir: Option<PathBuf>,
    /// Globally installed plugin directories, searched after the local `plugins` dir
    pub global_module_dirs: Vec<PathBuf>,
    /// The host's own manifest, returned when resolving an empty identifier
    pub host_manifest: Option<PathBuf>,
    /// Bound for start, configure and shutdown callbacks
    pub transition_timeout_ms: u64,
    /// Save the registry after every add/remove/enable/disable
    pub persist_on_change: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        let storage_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(constants::STORAGE_DIR_NAME);
        Self {
            storage_dir,
            config_dir: None,
            working_dir: None,
            global_module_dirs: Vec::new(),
            host_manifest: None,
            transition_timeout_ms: constants::DEFAULT_TRANSITION_TIMEOUT_MS,
            persist_on_change: true,
        }
    }
}

impl HostConfig {
    /// Read a host config file; the format follows the file extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            StorageSystemError::UnsupportedConfigFormat(path.display().to_string())
        })?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, "read_host_config", path.to_path_buf()))?;
        Ok(format.deserialize::<HostConfig>(&content)?)
    }
}

/// Explicitly constructed host context shared by the lifecycle components.
///
/// Replaces process-wide host state: everything that needs the host's paths
/// or storage receives an `Arc<HostContext>`, and [`HostContext::teardown`]
/// ends its life explicitly.
pub struct HostContext {
    config: HostConfig,
    storage_dir: PathBuf,
    config_dir: PathBuf,
    working_dir: PathBuf,
    storage: Arc<dyn StorageProvider>,
    torn_down: AtomicBool,
}

impl HostContext {
    /// Build a context from a config, filling in path defaults.
    pub fn new(config: HostConfig) -> Result<Self> {
        if config.transition_timeout_ms == 0 {
            return Err(Error::Config("transition_timeout_ms must be greater than zero".into()));
        }
        let working_dir = match &config.working_dir {
            Some(dir) => dir.clone(),
            None => env::current_dir()
                .map_err(|e| Error::io(e, "current_dir", PathBuf::from(".")))?,
        };
        let storage_dir = absolutize(&working_dir, &config.storage_dir);
        let config_dir = match &config.config_dir {
            Some(dir) => absolutize(&working_dir, dir),
            None => storage_dir.join(constants::CONFIG_DIR_NAME),
        };
        let storage: Arc<dyn StorageProvider> =
            Arc::new(LocalStorageProvider::new(storage_dir.clone()));

        log::debug!(
            "Host context: storage {}, config {}, working dir {}",
            storage_dir.display(),
            config_dir.display(),
            working_dir.display()
        );

        Ok(Self {
            config,
            storage_dir,
            config_dir,
            working_dir,
            storage,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Build a context from a host config file.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(HostConfig::from_file(path)?)
    }

    pub fn builder() -> HostContextBuilder {
        HostContextBuilder::default()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Path of the persisted registry file
    pub fn registry_file(&self) -> PathBuf {
        self.storage_dir.join(constants::REGISTRY_FILE_NAME)
    }

    /// The host's own manifest, if configured
    pub fn host_manifest(&self) -> Option<PathBuf> {
        self.config
            .host_manifest
            .as_ref()
            .map(|p| absolutize(&self.working_dir, p))
    }

    /// Directories searched for bare plugin names, in priority order
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.working_dir.join(constants::LOCAL_PLUGINS_DIR)];
        paths.extend(
            self.config
                .global_module_dirs
                .iter()
                .map(|dir| absolutize(&self.working_dir, dir)),
        );
        paths
    }

    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.config.transition_timeout_ms)
    }

    pub fn persist_on_change(&self) -> bool {
        self.config.persist_on_change
    }

    /// Fails once the context has been torn down.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(Error::ContextTornDown);
        }
        Ok(())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Mark the context as finished. Idempotent.
    pub fn teardown(&self) {
        if !self.torn_down.swap(true, Ordering::AcqRel) {
            log::info!("{} host context torn down", constants::APP_NAME);
        }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("storage_dir", &self.storage_dir)
            .field("config_dir", &self.config_dir)
            .field("working_dir", &self.working_dir)
            .field("storage", &self.storage.name())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// Builder for [`HostContext`], starting from [`HostConfig::default`].
#[derive(Debug, Default)]
pub struct HostContextBuilder {
    config: HostConfig,
}

impl HostContextBuilder {
    pub fn from_config(config: HostConfig) -> Self {
        Self { config }
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.config_dir = Some(dir.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    pub fn global_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.global_module_dirs.push(dir.into());
        self
    }

    pub fn host_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.host_manifest = Some(path.into());
        self
    }

    pub fn transition_timeout(mut self, timeout: Duration) -> Self {
        self.config.transition_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn persist_on_change(mut self, persist: bool) -> Self {
        self.config.persist_on_change = persist;
        self
    }

    pub fn build(self) -> Result<HostContext> {
        HostContext::new(self.config)
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
