//! Eve door contact sensors as a bridgekit accessory platform.
//!
//! The crate builds both as a dynamic library exporting `_platform_init` and as
//! an rlib, so a host can also link it in and call [`register`].
use std::ffi::{CStr, c_void};
use std::os::raw::c_char;
use std::panic;
use std::ptr;
use std::sync::Mutex;

use async_trait::async_trait;
use bridgekit_core::plugin_system::ffi::{FfiPlatformType, FfiResult, PlatformVTable};
use bridgekit_core::{Platform, PlatformContext, PlatformType, PluginLoader};
use bridgekit_core::plugin_system::PluginError;
use serde::Deserialize;

/// Entry point name used when the platform is linked in
pub const ENTRY_POINT: &str = "eve-door";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoorConfig {
    #[serde(default = "default_doors")]
    doors: Vec<String>,
    #[serde(default)]
    debug: bool,
}

fn default_doors() -> Vec<String> {
    vec!["Front door".to_string()]
}

#[derive(Debug, Default)]
struct Accessories {
    /// Sensors published to the bridge
    registered: Vec<String>,
    /// Sensors restored from a previous run that are published again
    cached: usize,
}

/// The platform state shared by the trait impl and the C ABI
#[derive(Debug)]
pub struct EveDoorPlatform {
    config: DoorConfig,
    accessories: Mutex<Accessories>,
}

impl EveDoorPlatform {
    fn new(config: DoorConfig) -> Self {
        Self { config, accessories: Mutex::new(Accessories::default()) }
    }

    /// Build from the JSON config snapshot the host hands over
    pub fn from_json(config_json: &str) -> Result<Self, PluginError> {
        let config = serde_json::from_str(config_json)
            .map_err(|e| PluginError::InitError(format!("invalid eve-door config: {}", e)))?;
        Ok(Self::new(config))
    }

    fn accessories(&self) -> Result<std::sync::MutexGuard<'_, Accessories>, PluginError> {
        self.accessories
            .lock()
            .map_err(|_| PluginError::ExecutionError("accessory state poisoned".to_string()))
    }

    fn start(&self, reason: &str) -> Result<(), PluginError> {
        let mut accessories = self.accessories()?;
        if self.config.debug {
            log::debug!("eve-door starting ({}) with {:?}", reason, self.config.doors);
        }
        accessories.cached = accessories.registered.len();
        accessories.registered = self.config.doors.clone();
        log::info!("eve-door registered {} contact sensor(s)", accessories.registered.len());
        Ok(())
    }

    fn configure(&self) -> Result<(), PluginError> {
        if self.config.doors.iter().any(|door| door.trim().is_empty()) {
            return Err(PluginError::ConfigureError("door names must not be empty".to_string()));
        }
        Ok(())
    }

    fn shutdown(&self, reason: &str, remove_devices: bool) -> Result<(), PluginError> {
        let mut accessories = self.accessories()?;
        log::info!("eve-door shutting down: {}", reason);
        if remove_devices {
            accessories.registered.clear();
            accessories.cached = 0;
        }
        Ok(())
    }

    fn registered(&self) -> usize {
        self.accessories().map(|a| a.registered.len()).unwrap_or(0)
    }

    fn added(&self) -> usize {
        self.accessories()
            .map(|a| a.registered.len().saturating_sub(a.cached))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Platform for EveDoorPlatform {
    fn platform_type(&self) -> PlatformType {
        PlatformType::AccessoryPlatform
    }

    async fn on_start(&self, reason: &str) -> Result<(), PluginError> {
        self.start(reason)
    }

    async fn on_configure(&self) -> Result<(), PluginError> {
        self.configure()
    }

    async fn on_shutdown(&self, reason: &str, remove_devices: bool) -> Result<(), PluginError> {
        self.shutdown(reason, remove_devices)
    }

    fn registered_devices(&self) -> usize {
        self.registered()
    }

    fn added_devices(&self) -> usize {
        self.added()
    }
}

/// Make the platform available to `loader` without a dynamic library
pub fn register(loader: &mut PluginLoader) {
    loader.register_platform(ENTRY_POINT, |context: PlatformContext| {
        let config = serde_json::from_value(context.config.to_value())
            .map_err(|e| PluginError::InitError(format!("invalid eve-door config: {}", e)))?;
        Ok(Box::new(EveDoorPlatform::new(config)) as Box<dyn Platform>)
    });
}

// --- C ABI ---

fn platform<'a>(instance: *const c_void) -> &'a EveDoorPlatform {
    unsafe { &*(instance as *const EveDoorPlatform) }
}

fn reason_str<'a>(reason: *const c_char) -> Result<&'a str, FfiResult> {
    if reason.is_null() {
        return Err(FfiResult::NullPointer);
    }
    unsafe { CStr::from_ptr(reason) }
        .to_str()
        .map_err(|_| FfiResult::Utf8Error)
}

fn status(result: Result<(), PluginError>) -> FfiResult {
    match result {
        Ok(()) => FfiResult::Ok,
        Err(e) => {
            log::error!("eve-door: {}", e);
            FfiResult::Err
        }
    }
}

extern "C-unwind" fn ffi_platform_type(_instance: *const c_void) -> u32 {
    FfiPlatformType::AccessoryPlatform as u32
}

extern "C-unwind" fn ffi_on_start(instance: *mut c_void, reason: *const c_char) -> FfiResult {
    match reason_str(reason) {
        Ok(reason) => status(platform(instance).start(reason)),
        Err(code) => code,
    }
}

extern "C-unwind" fn ffi_on_configure(instance: *mut c_void) -> FfiResult {
    status(platform(instance).configure())
}

extern "C-unwind" fn ffi_on_shutdown(instance: *mut c_void, reason: *const c_char, remove_devices: bool) -> FfiResult {
    match reason_str(reason) {
        Ok(reason) => status(platform(instance).shutdown(reason, remove_devices)),
        Err(code) => code,
    }
}

extern "C-unwind" fn ffi_registered_devices(instance: *const c_void) -> u32 {
    platform(instance).registered() as u32
}

extern "C-unwind" fn ffi_added_devices(instance: *const c_void) -> u32 {
    platform(instance).added() as u32
}

extern "C-unwind" fn ffi_destroy(instance: *mut c_void) {
    if !instance.is_null() {
        drop(unsafe { Box::from_raw(instance as *mut EveDoorPlatform) });
    }
}

/// Library entry point: builds the platform from the config JSON, or returns null
#[no_mangle]
pub extern "C-unwind" fn _platform_init(config_json: *const c_char) -> *mut PlatformVTable {
    let result = panic::catch_unwind(|| {
        if config_json.is_null() {
            return ptr::null_mut();
        }
        let config = match unsafe { CStr::from_ptr(config_json) }.to_str() {
            Ok(config) => config,
            Err(_) => return ptr::null_mut(),
        };
        let platform = match EveDoorPlatform::from_json(config) {
            Ok(platform) => platform,
            Err(e) => {
                log::error!("eve-door: {}", e);
                return ptr::null_mut();
            }
        };

        Box::into_raw(Box::new(PlatformVTable {
            instance: Box::into_raw(Box::new(platform)) as *mut c_void,
            platform_type: ffi_platform_type,
            on_start: ffi_on_start,
            on_configure: ffi_on_configure,
            on_shutdown: ffi_on_shutdown,
            registered_devices: ffi_registered_devices,
            added_devices: ffi_added_devices,
            destroy: ffi_destroy,
        }))
    });

    result.unwrap_or_else(|_| {
        log::error!("eve-door: panic during _platform_init");
        ptr::null_mut()
    })
}

#[cfg(test)]
mod tests;
