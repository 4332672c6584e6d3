use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::kernel::error::Result;
use crate::plugin_system::manifest::PluginManifest;
use crate::plugin_system::traits::PlatformType;
use crate::storage::StorageProvider;
use crate::storage::error::StorageSystemError;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    fn label(&self) -> String {
        self.extension().to_uppercase()
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    /// Serialize a value in this format
    pub fn serialize<T: Serialize>(&self, value: &T) -> std::result::Result<String, StorageSystemError> {
        let result = match self {
            ConfigFormat::Json => serde_json::to_string_pretty(value)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(value)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(value)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        };
        result.map_err(|source| StorageSystemError::SerializationError {
            format: self.label(),
            source,
        })
    }

    /// Deserialize a value from a string in this format
    pub fn deserialize<T: DeserializeOwned>(&self, content: &str) -> std::result::Result<T, StorageSystemError> {
        let result = match self {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        };
        result.map_err(|source| StorageSystemError::DeserializationError {
            format: self.label(),
            source,
        })
    }
}

/// In-memory representation of a plugin's configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigData {
    values: Map<String, Value>,
}

impl ConfigData {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self { values: Map::new() }
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| StorageSystemError::SerializationError {
            format: "JSON".to_string(),
            source: Box::new(e),
        })?;
        self.values.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The whole config as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Reads and creates the per-plugin config files and schema snapshots.
#[derive(Debug, Clone)]
pub struct PluginConfigManager {
    provider: Arc<dyn StorageProvider>,
    config_dir: PathBuf,
    format: ConfigFormat,
}

impl PluginConfigManager {
    pub fn new(provider: Arc<dyn StorageProvider>, config_dir: PathBuf) -> Self {
        Self::with_format(provider, config_dir, ConfigFormat::Json)
    }

    pub fn with_format(provider: Arc<dyn StorageProvider>, config_dir: PathBuf, format: ConfigFormat) -> Self {
        Self { provider, config_dir, format }
    }

    /// `<config_dir>/<name>.config.<ext>`
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir
            .join(format!("{}.config.{}", name, self.format.extension()))
    }

    /// Default config written the first time a plugin is loaded
    pub fn default_config(name: &str, plugin_type: PlatformType) -> ConfigData {
        let mut values = Map::new();
        values.insert("name".into(), json!(name));
        values.insert("type".into(), json!(plugin_type));
        values.insert("debug".into(), json!(false));
        values.insert("unregisterOnShutdown".into(), json!(false));
        ConfigData { values }
    }

    /// Read the plugin's config, creating it with defaults when missing.
    pub fn load_or_create(&self, name: &str, plugin_type: PlatformType) -> Result<ConfigData> {
        let path = self.config_path(name);
        if self.provider.exists(&path) {
            let content = self.provider.read_to_string(&path)?;
            let mut config: ConfigData = self.format.deserialize(&content)?;
            if !config.contains_key("name") {
                config.set("name", name)?;
            }
            log::debug!("Loaded config for plugin {} from {}", name, path.display());
            return Ok(config);
        }

        let config = Self::default_config(name, plugin_type);
        self.save(name, &config)?;
        log::debug!("Created config for plugin {} at {}", name, path.display());
        Ok(config)
    }

    pub fn save(&self, name: &str, config: &ConfigData) -> Result<()> {
        let path = self.config_path(name);
        self.provider.create_dir_all(&self.config_dir)?;
        let content = self.format.serialize(config)?;
        self.provider.write_string(&path, &content)
    }

    /// Schema shipped next to the manifest as `<name>.schema.json`, or a default
    /// object schema describing the default config keys.
    pub fn load_schema(&self, manifest: &PluginManifest) -> Result<Value> {
        let path = manifest
            .plugin_base_dir
            .join(format!("{}.schema.json", manifest.name));
        if self.provider.is_file(&path) {
            let content = self.provider.read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(schema) => return Ok(schema),
                Err(e) => log::warn!(
                    "Ignoring malformed schema {} for plugin {}: {}",
                    path.display(),
                    manifest.name,
                    e
                ),
            }
        }
        Ok(Self::default_schema(manifest))
    }

    pub fn default_schema(manifest: &PluginManifest) -> Value {
        json!({
            "title": manifest.name,
            "description": format!("{} v.{} by {}", manifest.name, manifest.version, manifest.author),
            "type": "object",
            "properties": {
                "name": { "description": "Plugin name", "type": "string", "readOnly": true },
                "type": { "description": "Plugin type", "type": "string", "readOnly": true },
                "debug": { "description": "Enable the debug for the plugin", "type": "boolean", "default": false },
                "unregisterOnShutdown": { "description": "Unregister all devices on shutdown", "type": "boolean", "default": false }
            }
        })
    }
}
