#![cfg(test)]

use futures::future::join_all;
use tokio::test;

use crate::storage::StoredPlugin;
use crate::storage::config::ConfigFormat;

use super::common::{install_plugin, setup_test_environment};

fn read_registry(path: &std::path::Path) -> Vec<StoredPlugin> {
    let content = std::fs::read_to_string(path).expect("registry file");
    ConfigFormat::Json.deserialize(&content).expect("registry file is valid JSON")
}

#[test]
async fn test_concurrent_adds_persist_every_plugin() {
    let (dir, context, manager, _log) = setup_test_environment();
    let names: Vec<String> = (0..12).map(|i| format!("plugin-{}", i)).collect();
    for name in &names {
        install_plugin(&dir.path().join("plugins"), name);
    }

    let added = join_all(names.iter().map(|name| manager.add(name))).await;
    assert!(added.iter().all(|r| matches!(r, Ok(Some(_)))));

    let stored = read_registry(&context.registry_file());
    assert_eq!(stored.len(), names.len());
    let in_memory: Vec<String> = manager.names().await;
    let on_disk: Vec<String> = stored.into_iter().map(|p| p.name).collect();
    assert_eq!(on_disk, in_memory, "Persisted order follows the registry");
}

#[test]
async fn test_no_temp_files_left_behind() {
    let (dir, context, manager, _log) = setup_test_environment();
    install_plugin(&dir.path().join("plugins"), "alpha");
    manager.add("alpha").await.expect("add");
    manager.disable("alpha").await.expect("disable");
    manager.enable("alpha").await.expect("enable");

    let leftovers: Vec<_> = std::fs::read_dir(context.storage_dir())
        .expect("storage dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "plugins.json")
        .collect();
    assert!(leftovers.is_empty(), "Unexpected files: {:?}", leftovers);
}

#[test]
async fn test_remove_and_readd_moves_plugin_to_the_end() {
    let (dir, context, manager, _log) = setup_test_environment();
    for name in ["alpha", "beta", "gamma"] {
        install_plugin(&dir.path().join("plugins"), name);
        manager.add(name).await.expect("add").expect("added");
    }

    manager.remove("alpha").await.expect("remove").expect("removed");
    manager.add("alpha").await.expect("add").expect("added");

    let on_disk: Vec<String> = read_registry(&context.registry_file())
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(on_disk, vec!["beta", "gamma", "alpha"]);
}

#[test]
async fn test_persist_on_change_disabled_defers_writes() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let context = crate::kernel::context::HostContext::builder()
        .working_dir(dir.path())
        .storage_dir(dir.path().join("storage"))
        .persist_on_change(false)
        .build()
        .expect("context");
    let context = std::sync::Arc::new(context);
    let manager = crate::plugin_system::manager::PluginManager::new(std::sync::Arc::clone(&context));
    install_plugin(&dir.path().join("plugins"), "alpha");

    manager.add("alpha").await.expect("add").expect("added");
    assert!(!context.registry_file().exists());
    assert_eq!(manager.save_to_storage().await.expect("save"), 1);
    assert_eq!(read_registry(&context.registry_file()).len(), 1);
}
