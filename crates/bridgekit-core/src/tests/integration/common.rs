#![cfg(test)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::{TempDir, tempdir};

use crate::kernel::context::HostContext;
use crate::plugin_system::loader::PluginLoader;
use crate::plugin_system::manager::PluginManager;
use crate::plugin_system::traits::{Platform, PlatformContext, PlatformType, PluginError};

/// Entry point of the in-process test bridge platform
pub const BRIDGE_ENTRY_POINT: &str = "test-bridge";

/// Shared record of platform callbacks, in order
pub type EventLog = Arc<StdMutex<Vec<String>>>;

/// A dynamic platform that "discovers" the devices listed in its config on start
/// and forgets them on a shutdown that removes devices.
pub struct BridgePlatform {
    name: String,
    devices: usize,
    registered: AtomicUsize,
    events: EventLog,
}

impl BridgePlatform {
    fn new(context: PlatformContext, events: EventLog) -> Self {
        let devices = context.config.get::<usize>("devices").unwrap_or(2);
        Self {
            name: context.name,
            devices,
            registered: AtomicUsize::new(0),
            events,
        }
    }

    fn log(&self, event: &str) {
        self.events
            .lock()
            .expect("event log poisoned")
            .push(format!("{}:{}", self.name, event));
    }
}

#[async_trait]
impl Platform for BridgePlatform {
    fn platform_type(&self) -> PlatformType {
        PlatformType::DynamicPlatform
    }

    async fn on_start(&self, _reason: &str) -> Result<(), PluginError> {
        self.log("start");
        self.registered.store(self.devices, Ordering::SeqCst);
        Ok(())
    }

    async fn on_configure(&self) -> Result<(), PluginError> {
        self.log("configure");
        Ok(())
    }

    async fn on_shutdown(&self, _reason: &str, remove_devices: bool) -> Result<(), PluginError> {
        self.log("shutdown");
        if remove_devices {
            self.registered.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    fn registered_devices(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    fn added_devices(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }
}

/// A loader that knows the bridge platform
pub fn bridge_loader(events: &EventLog) -> PluginLoader {
    let events = Arc::clone(events);
    let mut loader = PluginLoader::new();
    loader.register_platform(BRIDGE_ENTRY_POINT, move |context| {
        Ok(Box::new(BridgePlatform::new(context, Arc::clone(&events))) as Box<dyn Platform>)
    });
    loader
}

/// Write `<dir>/<name>/manifest.json` for a bridge plugin
pub fn install_plugin(dir: &Path, name: &str) -> PathBuf {
    let plugin_dir = dir.join(name);
    std::fs::create_dir_all(&plugin_dir).expect("Failed to create plugin directory");
    let manifest = plugin_dir.join("manifest.json");
    std::fs::write(
        &manifest,
        json!({
            "name": name,
            "version": "0.4.0",
            "description": format!("{} bridge", name),
            "author": "Integration",
            "entry_point": BRIDGE_ENTRY_POINT,
            "type": "DynamicPlatform",
        })
        .to_string(),
    )
    .expect("Failed to write manifest");
    manifest
}

/// Temp dir, host context rooted in it, a manager with the bridge loader and its event log
pub fn setup_test_environment() -> (TempDir, Arc<HostContext>, PluginManager, EventLog) {
    let dir = tempdir().expect("Failed to create temp directory");
    let context = Arc::new(host_context(dir.path()));
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let manager = PluginManager::with_loader(Arc::clone(&context), bridge_loader(&events));
    (dir, context, manager, events)
}

/// A fresh context over the same directory, as a restarted host would build
pub fn host_context(root: &Path) -> HostContext {
    HostContext::builder()
        .working_dir(root)
        .storage_dir(root.join("storage"))
        .build()
        .expect("Failed to build host context")
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().expect("event log poisoned").clone()
}
