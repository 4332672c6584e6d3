use std::path::{Path, PathBuf};

use semver::Version;
use serde::Deserialize;

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::traits::PlatformType;

/// A parsed `manifest.json`
#[derive(Debug, Clone, PartialEq)]
pub struct PluginManifest {
    /// Package name, the registry key
    pub name: String,

    /// Plugin version
    pub version: Version,

    /// Plugin description
    pub description: String,

    /// Plugin author
    pub author: String,

    /// Entry point: a constructor key registered with the loader, or a
    /// library path relative to the plugin directory
    pub entry_point: String,

    /// Declared platform type, used for the first config snapshot
    pub platform_type: Option<PlatformType>,

    /// Project homepage (optional)
    pub homepage: Option<String>,

    /// License information
    pub license: Option<String>,

    pub keywords: Vec<String>,

    /// Where the manifest was read from
    pub manifest_path: PathBuf,

    /// Directory holding the manifest
    pub plugin_base_dir: PathBuf,
}

#[derive(Deserialize, Debug)]
struct RawPluginManifest {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(rename = "type", default)]
    platform_type: Option<PlatformType>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl PluginManifest {
    /// Library file name the entry point defaults to, e.g. `libeve_door.so`
    pub fn default_entry_point(name: &str) -> String {
        let bare = name.rsplit('/').next().unwrap_or(name);
        libloading::library_filename(bare.replace('-', "_"))
            .to_string_lossy()
            .into_owned()
    }

    /// Overwrite the descriptor's placeholder metadata
    pub fn apply_to(&self, descriptor: &mut PluginDescriptor) {
        descriptor.version = self.version.to_string();
        descriptor.description = self.description.clone();
        descriptor.author = self.author.clone();
    }

    fn from_raw(raw: RawPluginManifest, path: &Path) -> std::result::Result<Self, String> {
        if raw.name.trim().is_empty() {
            return Err("empty 'name'".to_string());
        }
        let version = Version::parse(raw.version.trim())
            .map_err(|e| format!("invalid version '{}': {}", raw.version, e))?;
        let plugin_base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let entry_point = raw
            .entry_point
            .filter(|entry| !entry.trim().is_empty())
            .unwrap_or_else(|| Self::default_entry_point(&raw.name));

        Ok(Self {
            entry_point,
            version,
            description: raw
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| constants::DEFAULT_DESCRIPTION.to_string()),
            author: raw
                .author
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| constants::DEFAULT_AUTHOR.to_string()),
            name: raw.name,
            platform_type: raw.platform_type,
            homepage: raw.homepage,
            license: raw.license,
            keywords: raw.keywords,
            manifest_path: path.to_path_buf(),
            plugin_base_dir,
        })
    }
}

/// Read and validate the manifest at `path`.
///
/// Malformed content (bad encoding, invalid JSON, missing `name`/`version`,
/// a version that is not semver) logs a warning and yields `Ok(None)`. A file
/// that cannot be read at all is an error.
pub async fn read_manifest(path: &Path) -> Result<Option<PluginManifest>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::io(e, "read_manifest", path.to_path_buf()))?;

    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Manifest {} is not valid UTF-8: {}", path.display(), e);
            return Ok(None);
        }
    };
    let raw: RawPluginManifest = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Manifest {} is malformed: {}", path.display(), e);
            return Ok(None);
        }
    };
    match PluginManifest::from_raw(raw, path) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(message) => {
            log::warn!("Manifest {} is malformed: {}", path.display(), message);
            Ok(None)
        }
    }
}

/// Parse the manifest at `descriptor.path` into the descriptor.
///
/// On malformed input the placeholders stay and `Ok(None)` is returned. A
/// manifest naming a different plugin than the descriptor is rejected with
/// [`PluginSystemError::ManifestNameMismatch`] and the descriptor is untouched.
pub async fn parse(descriptor: &mut PluginDescriptor) -> Result<Option<PluginManifest>> {
    let Some(manifest) = read_manifest(&descriptor.path).await? else {
        return Ok(None);
    };
    if manifest.name != descriptor.name {
        return Err(PluginSystemError::ManifestNameMismatch {
            expected: descriptor.name.clone(),
            found: manifest.name,
            path: descriptor.path.clone(),
        }
        .into());
    }
    manifest.apply_to(descriptor);
    Ok(Some(manifest))
}

/// Builder for creating a plugin manifest
pub struct ManifestBuilder {
    manifest: PluginManifest,
}

impl ManifestBuilder {
    /// Create a new manifest builder
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            manifest: PluginManifest {
                name: name.to_string(),
                version,
                description: constants::DEFAULT_DESCRIPTION.to_string(),
                author: constants::DEFAULT_AUTHOR.to_string(),
                entry_point: PluginManifest::default_entry_point(name),
                platform_type: None,
                homepage: None,
                license: None,
                keywords: Vec::new(),
                manifest_path: PathBuf::from(constants::MANIFEST_FILE_NAME),
                plugin_base_dir: PathBuf::new(),
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.manifest.description = description.to_string();
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.manifest.author = author.to_string();
        self
    }

    pub fn entry_point(mut self, entry_point: &str) -> Self {
        self.manifest.entry_point = entry_point.to_string();
        self
    }

    pub fn platform_type(mut self, platform_type: PlatformType) -> Self {
        self.manifest.platform_type = Some(platform_type);
        self
    }

    pub fn homepage(mut self, homepage: &str) -> Self {
        self.manifest.homepage = Some(homepage.to_string());
        self
    }

    pub fn license(mut self, license: &str) -> Self {
        self.manifest.license = Some(license.to_string());
        self
    }

    pub fn keyword(mut self, keyword: &str) -> Self {
        self.manifest.keywords.push(keyword.to_string());
        self
    }

    /// Set the manifest location; the plugin directory follows from it
    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.manifest.plugin_base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.manifest.manifest_path = path;
        self
    }

    pub fn build(self) -> PluginManifest {
        self.manifest
    }
}
