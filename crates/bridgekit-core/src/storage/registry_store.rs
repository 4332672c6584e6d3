use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::kernel::error::Result;
use crate::plugin_system::traits::PlatformType;
use crate::storage::StorageProvider;
use crate::storage::config::ConfigFormat;

/// The stable subset of a descriptor that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPlugin {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type", default)]
    pub plugin_type: PlatformType,
    pub version: String,
    pub description: String,
    pub author: String,
    pub enabled: bool,
}

/// Reads and rewrites the persisted plugin list (`plugins.json`).
///
/// The file is a JSON array kept in registry order and is always rewritten
/// wholesale through the provider's atomic write.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    provider: Arc<dyn StorageProvider>,
    file: PathBuf,
}

impl RegistryStore {
    pub fn new(provider: Arc<dyn StorageProvider>, file: PathBuf) -> Self {
        Self { provider, file }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Persist `plugins` in order, returning how many records were written.
    pub fn save(&self, plugins: &[StoredPlugin]) -> Result<usize> {
        let content = ConfigFormat::Json.serialize(&plugins)?;
        self.provider.write_string(&self.file, &content)?;
        log::debug!("Saved {} plugin(s) to {}", plugins.len(), self.file.display());
        Ok(plugins.len())
    }

    /// Read the persisted list. A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<StoredPlugin>> {
        if !self.provider.exists(&self.file) {
            log::debug!("No registry file at {}", self.file.display());
            return Ok(Vec::new());
        }
        let content = self.provider.read_to_string(&self.file)?;
        let plugins: Vec<StoredPlugin> = ConfigFormat::Json.deserialize(&content)?;
        log::debug!("Loaded {} plugin(s) from {}", plugins.len(), self.file.display());
        Ok(plugins)
    }
}
