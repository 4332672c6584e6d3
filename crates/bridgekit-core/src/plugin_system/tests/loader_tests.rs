#![cfg(test)]

use std::path::PathBuf;

use semver::Version;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::PluginLoader;
use crate::plugin_system::manifest::{ManifestBuilder, PluginManifest};
use crate::plugin_system::traits::{PlatformContext, PlatformType, PluginError};
use crate::storage::ConfigData;

use super::mocks::MockSpec;

fn manifest(name: &str, entry_point: &str) -> PluginManifest {
    ManifestBuilder::new(name, Version::new(0, 1, 0))
        .entry_point(entry_point)
        .manifest_path(PathBuf::from("/nonexistent/plugins").join(name).join("manifest.json"))
        .build()
}

fn context(name: &str) -> PlatformContext {
    PlatformContext {
        name: name.to_string(),
        manifest_path: PathBuf::from("/nonexistent/plugins").join(name).join("manifest.json"),
        config: ConfigData::new(),
    }
}

#[tokio::test]
async fn test_registered_constructor_is_used() {
    let spec = MockSpec::new(PlatformType::DynamicPlatform);
    let mut loader = PluginLoader::new();
    spec.register(&mut loader, "mock");
    assert!(loader.has_constructor("mock"));
    assert!(!loader.has_constructor("other"));

    let platform = loader
        .instantiate(&manifest("plugin-a", "mock"), context("plugin-a"))
        .await
        .expect("constructor should succeed");
    assert_eq!(platform.platform_type(), PlatformType::DynamicPlatform);
    assert_eq!(spec.calls(), vec!["construct:plugin-a"]);
}

#[tokio::test]
async fn test_constructor_failure_is_loading_error() {
    let spec = MockSpec::new(PlatformType::AccessoryPlatform).failing_construct("no bridge");
    let mut loader = PluginLoader::new();
    spec.register(&mut loader, "mock");

    match loader.instantiate(&manifest("plugin-a", "mock"), context("plugin-a")).await {
        Err(PluginSystemError::LoadingError { plugin_id, path, source }) => {
            assert_eq!(plugin_id, "plugin-a");
            assert!(path.is_none());
            assert!(source.to_string().contains("no bridge"), "Unexpected source: {}", source);
        }
        other => panic!("Expected LoadingError, got {:?}", other.map(|p| p.platform_type())),
    }
}

#[tokio::test]
async fn test_constructor_panic_is_caught() {
    let mut loader = PluginLoader::new();
    loader.register_platform("panics", |_context| -> Result<Box<dyn crate::plugin_system::Platform>, PluginError> {
        panic!("constructor exploded")
    });

    match loader.instantiate(&manifest("plugin-a", "panics"), context("plugin-a")).await {
        Err(PluginSystemError::FfiError { plugin_id, operation, message }) => {
            assert_eq!(plugin_id, "plugin-a");
            assert_eq!(operation, "construct");
            assert!(message.contains("constructor exploded"), "Unexpected message: {}", message);
        }
        other => panic!("Expected FfiError, got {:?}", other.map(|p| p.platform_type())),
    }
}

#[tokio::test]
async fn test_missing_library_is_loading_error() {
    let loader = PluginLoader::new();
    let manifest = manifest("plugin-a", "libnot_there.so");
    assert_eq!(
        PluginLoader::library_path(&manifest),
        PathBuf::from("/nonexistent/plugins/plugin-a/libnot_there.so")
    );

    match loader.instantiate(&manifest, context("plugin-a")).await {
        Err(PluginSystemError::LoadingError { plugin_id, path, source }) => {
            assert_eq!(plugin_id, "plugin-a");
            assert_eq!(path, Some(PluginLoader::library_path(&manifest)));
            assert!(source.to_string().contains("libloading error"), "Unexpected source: {}", source);
        }
        other => panic!("Expected LoadingError, got {:?}", other.map(|p| p.platform_type())),
    }
}

#[test]
fn test_absolute_entry_point_is_kept() {
    let manifest = manifest("plugin-a", "/opt/lib/libplugin_a.so");
    assert_eq!(PluginLoader::library_path(&manifest), PathBuf::from("/opt/lib/libplugin_a.so"));
}
