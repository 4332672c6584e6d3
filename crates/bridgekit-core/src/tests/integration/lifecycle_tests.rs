#![cfg(test)]

use std::sync::Arc;

use tokio::test;

use crate::kernel::component::KernelComponent;
use crate::kernel::context::HostContext;
use crate::plugin_system::manager::PluginManager;
use crate::{LoadMode, PlatformType};

use super::common::{bridge_loader, events, host_context, install_plugin, setup_test_environment};

#[test]
async fn test_plugin_walks_the_state_machine() {
    let (dir, _context, manager, log) = setup_test_environment();
    install_plugin(&dir.path().join("plugins"), "hue-bridge");

    let added = manager.add("./plugins/hue-bridge").await.expect("add").expect("added");
    assert_eq!(added.plugin_type, PlatformType::Unknown);
    assert!(manager.add("hue-bridge").await.expect("add").is_none());

    assert!(manager.load("hue-bridge", LoadMode::LoadOnly, "boot").await.expect("load").is_completed());
    let loaded = manager.get("hue-bridge").await.expect("registered");
    assert_eq!(loaded.plugin_type, PlatformType::DynamicPlatform);
    assert_eq!(loaded.registered_devices, Some(0));

    manager.start("hue-bridge", "boot", false).await.expect("start");
    manager.configure("hue-bridge").await.expect("configure");
    let configured = manager.get("hue-bridge").await.expect("registered");
    assert!(configured.is_loaded() && configured.is_started() && configured.is_configured());
    assert_eq!(configured.registered_devices, Some(2), "Counters are read live");

    manager.shutdown("hue-bridge", "stop", true).await.expect("shutdown");
    let registered = manager.get("hue-bridge").await.expect("registered");
    assert!(!registered.is_loaded());
    assert_eq!(registered.registered_devices, None);

    assert!(manager.remove("hue-bridge").await.expect("remove").is_some());
    assert!(manager.is_empty().await);
    assert_eq!(
        events(&log),
        vec!["hue-bridge:start", "hue-bridge:configure", "hue-bridge:shutdown"]
    );
}

#[test]
async fn test_plugin_config_drives_platform() {
    let (dir, context, manager, _log) = setup_test_environment();
    install_plugin(&dir.path().join("plugins"), "zigbee");
    std::fs::create_dir_all(context.config_dir()).expect("mkdir");
    std::fs::write(
        context.config_dir().join("zigbee.config.json"),
        r#"{"name": "zigbee", "devices": 7, "debug": true}"#,
    )
    .expect("write config");

    manager.add("zigbee").await.expect("add").expect("added");
    let outcome = manager.load("zigbee", LoadMode::Start, "boot").await.expect("load");
    let descriptor = outcome.descriptor().expect("descriptor");
    assert_eq!(descriptor.registered_devices, Some(7));
    let config = descriptor.config.as_ref().expect("config snapshot");
    assert_eq!(config.get::<bool>("debug"), Some(true));
    assert_eq!(config.get::<PlatformType>("type"), Some(PlatformType::DynamicPlatform));
}

#[test]
async fn test_global_module_dirs_are_searched() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let global = dir.path().join("global_modules");
    install_plugin(&global, "@acme/eve-door");
    let context = HostContext::builder()
        .working_dir(dir.path())
        .storage_dir(dir.path().join("storage"))
        .global_module_dir(&global)
        .build()
        .expect("context");
    let log = Default::default();
    let manager = PluginManager::with_loader(Arc::new(context), bridge_loader(&log));

    let added = manager.add("@acme/eve-door").await.expect("add").expect("added");
    assert_eq!(added.path, global.join("@acme").join("eve-door").join("manifest.json"));
    assert!(manager.load("@acme/eve-door", LoadMode::StartAndConfigure, "boot").await.expect("load").is_completed());
}

#[test]
async fn test_host_restart_restores_registry() {
    let (dir, _context, manager, _log) = setup_test_environment();
    for name in ["alpha", "beta", "gamma"] {
        install_plugin(&dir.path().join("plugins"), name);
        manager.add(name).await.expect("add").expect("added");
    }
    manager.disable("beta").await.expect("disable").expect("registered");
    KernelComponent::start(&manager).await.expect("start");
    manager.teardown().await.expect("teardown");

    let log = Default::default();
    let restarted = PluginManager::with_loader(Arc::new(host_context(dir.path())), bridge_loader(&log));
    restarted.initialize().await.expect("initialize");
    assert_eq!(restarted.names().await, vec!["alpha", "beta", "gamma"]);
    let restored = restarted.descriptors().await;
    assert!(restored.iter().all(|d| !d.is_loaded()));
    assert_eq!(restored[0].version, "0.4.0", "Parsed metadata was saved at teardown");
    assert!(!restored[1].enabled);

    KernelComponent::start(&restarted).await.expect("start");
    let started: Vec<String> = restarted
        .descriptors()
        .await
        .into_iter()
        .filter(|d| d.is_configured())
        .map(|d| d.name)
        .collect();
    assert_eq!(started, vec!["alpha", "gamma"]);
    restarted.stop().await.expect("stop");
}

#[test]
async fn test_host_config_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let config_file = dir.path().join("host.json");
    std::fs::write(
        &config_file,
        serde_json::json!({
            "storage_dir": dir.path().join("state"),
            "working_dir": dir.path(),
            "transition_timeout_ms": 250,
        })
        .to_string(),
    )
    .expect("write host config");

    let context = HostContext::from_config_file(&config_file).expect("context");
    assert_eq!(context.transition_timeout(), std::time::Duration::from_millis(250));
    assert_eq!(context.registry_file(), dir.path().join("state").join("plugins.json"));

    install_plugin(&dir.path().join("plugins"), "alpha");
    let log = Default::default();
    let manager = PluginManager::with_loader(Arc::new(context), bridge_loader(&log));
    manager.add("alpha").await.expect("add").expect("added");
    assert!(dir.path().join("state").join("plugins.json").exists());
}
