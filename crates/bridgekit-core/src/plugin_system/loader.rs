use std::collections::HashMap;
use std::ffi::{CString, c_void};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use libloading::{Library, Symbol};

use crate::kernel::constants;
use crate::plugin_system::error::{PluginSystemError, PluginSystemErrorSource};
use crate::plugin_system::ffi::{
    FfiPlatformType, FfiResult, PlatformInitFn, PlatformVTable, panic_message,
};
use crate::plugin_system::manifest::PluginManifest;
use crate::plugin_system::traits::{Platform, PlatformContext, PlatformType, PluginError};

/// Builds a platform in-process from its context
pub type PlatformConstructor =
    Arc<dyn Fn(PlatformContext) -> Result<Box<dyn Platform>, PluginError> + Send + Sync>;

/// Turns a manifest's entry point into a live platform instance.
///
/// Constructors registered with [`PluginLoader::register_platform`] are
/// matched against the entry point first. Anything else is treated as a
/// dynamic library path relative to the plugin directory, opened with
/// `libloading` and initialized through `_platform_init`.
#[derive(Clone, Default)]
pub struct PluginLoader {
    constructors: HashMap<String, PlatformConstructor>,
}

impl PluginLoader {
    /// Create a new plugin loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process constructor under an entry point name
    pub fn register_platform<F>(&mut self, entry_point: impl Into<String>, constructor: F)
    where
        F: Fn(PlatformContext) -> Result<Box<dyn Platform>, PluginError> + Send + Sync + 'static,
    {
        self.constructors
            .insert(entry_point.into(), Arc::new(constructor));
    }

    pub fn has_constructor(&self, entry_point: &str) -> bool {
        self.constructors.contains_key(entry_point)
    }

    /// Library path an entry point refers to
    pub fn library_path(manifest: &PluginManifest) -> PathBuf {
        let entry = Path::new(&manifest.entry_point);
        if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            manifest.plugin_base_dir.join(entry)
        }
    }

    /// Instantiate the platform for `manifest`. Every failure here belongs to the plugin.
    pub async fn instantiate(
        &self,
        manifest: &PluginManifest,
        context: PlatformContext,
    ) -> Result<Arc<dyn Platform>, PluginSystemError> {
        if let Some(constructor) = self.constructors.get(&manifest.entry_point) {
            log::debug!(
                "Constructing plugin {} from registered entry point {}",
                manifest.name,
                manifest.entry_point
            );
            let constructor = Arc::clone(constructor);
            // Constructors may block, so they run where a timeout can still fire
            let built = tokio::task::spawn_blocking(move || {
                panic::catch_unwind(AssertUnwindSafe(move || constructor(context)))
            })
            .await
            .map_err(|e| PluginSystemError::InternalError(format!("constructor task failed: {}", e)))?;
            return match built {
                Ok(Ok(platform)) => Ok(Arc::from(platform)),
                Ok(Err(e)) => Err(loading_error(&manifest.name, None, e.to_string())),
                Err(payload) => Err(PluginSystemError::FfiError {
                    plugin_id: manifest.name.clone(),
                    operation: "construct".to_string(),
                    message: format!("panic: {}", panic_message(&*payload)),
                }),
            };
        }

        let lib_path = Self::library_path(manifest);
        let config_json = serde_json::to_string(&context.config)
            .map_err(|e| PluginSystemError::LoadingError {
                plugin_id: manifest.name.clone(),
                path: Some(lib_path.clone()),
                source: Box::new(PluginSystemErrorSource::Json(e)),
            })?;
        let config_json = CString::new(config_json)
            .map_err(|e| loading_error(&manifest.name, Some(&lib_path), e.to_string()))?;

        log::debug!("Opening platform library {} for plugin {}", lib_path.display(), manifest.name);
        let plugin_id = manifest.name.clone();
        let platform = tokio::task::spawn_blocking(move || {
            LibraryPlatform::open(&lib_path, &plugin_id, &config_json)
        })
        .await
        .map_err(|e| PluginSystemError::InternalError(format!("library load task failed: {}", e)))??;
        Ok(Arc::new(platform))
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.constructors.keys().collect();
        keys.sort();
        f.debug_struct("PluginLoader")
            .field("constructors", &keys)
            .finish()
    }
}

fn loading_error(plugin_id: &str, path: Option<&Path>, message: String) -> PluginSystemError {
    PluginSystemError::LoadingError {
        plugin_id: plugin_id.to_string(),
        path: path.map(Path::to_path_buf),
        source: Box::new(PluginSystemErrorSource::Other(message)),
    }
}

struct LibraryInstance {
    vtable: *mut PlatformVTable,
    // Dropped after `vtable` is released in `Drop`
    _library: Library,
    name: String,
    // Held for every lifecycle callback. A callback the host stopped waiting
    // for still runs to completion before the next one is entered.
    serial: Mutex<()>,
}

// The vtable contract requires instances to be usable from any thread
unsafe impl Send for LibraryInstance {}
unsafe impl Sync for LibraryInstance {}

impl LibraryInstance {
    fn vtable(&self) -> &PlatformVTable {
        // Non-null and alive until Drop, checked in LibraryPlatform::open
        unsafe { &*self.vtable }
    }

    fn call<F>(&self, operation: &str, f: F) -> Result<(), PluginError>
    where
        F: FnOnce(&PlatformVTable) -> FfiResult,
    {
        let _serial = self.serial.lock().unwrap_or_else(PoisonError::into_inner);
        match panic::catch_unwind(AssertUnwindSafe(|| f(self.vtable()))) {
            Ok(FfiResult::Ok) => Ok(()),
            Ok(code) => Err(PluginError::ExecutionError(format!(
                "{} of plugin {} returned {:?}",
                operation, self.name, code
            ))),
            Err(payload) => Err(PluginError::ExecutionError(format!(
                "panic in {} of plugin {}: {}",
                operation,
                self.name,
                panic_message(&*payload)
            ))),
        }
    }

    fn counter(&self, f: extern "C-unwind" fn(*const c_void) -> u32) -> usize {
        let instance = self.vtable().instance as *const c_void;
        panic::catch_unwind(|| f(instance)).map_or(0, |n| n as usize)
    }
}

impl Drop for LibraryInstance {
    fn drop(&mut self) {
        if self.vtable.is_null() {
            return;
        }
        let vtable = unsafe { Box::from_raw(self.vtable) };
        self.vtable = std::ptr::null_mut();
        let destroy = vtable.destroy;
        let instance = vtable.instance;
        if panic::catch_unwind(move || destroy(instance)).is_err() {
            log::error!("Plugin {} panicked while being destroyed", self.name);
        }
    }
}

/// A platform backed by a dynamic library.
///
/// Callbacks run on the blocking pool so a stuck native call cannot stall the
/// runtime, and the instance stays alive until every in-flight call returns.
/// Lifecycle callbacks never overlap: one that outlived its transition
/// timeout holds off the next until it returns.
pub struct LibraryPlatform {
    inner: Arc<LibraryInstance>,
    platform_type: PlatformType,
}

impl LibraryPlatform {
    fn open(path: &Path, plugin_id: &str, config_json: &CString) -> Result<Self, PluginSystemError> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| loading_error(plugin_id, Some(path), format!("libloading error: {}", e)))?;

        let init_symbol: Symbol<PlatformInitFn> = unsafe { library.get(constants::PLATFORM_INIT_SYMBOL) }
            .map_err(|e| loading_error(plugin_id, Some(path), format!("missing symbol _platform_init: {}", e)))?;
        let init_fn: PlatformInitFn = *init_symbol;

        let config_ptr = config_json.as_ptr();
        let vtable_ptr = match panic::catch_unwind(|| unsafe { init_fn(config_ptr) }) {
            Ok(ptr) if !ptr.is_null() => ptr,
            Ok(_) => {
                return Err(loading_error(
                    plugin_id,
                    Some(path),
                    "Platform init returned null VTable".to_string(),
                ));
            }
            Err(payload) => {
                return Err(PluginSystemError::FfiError {
                    plugin_id: plugin_id.to_string(),
                    operation: "_platform_init".to_string(),
                    message: format!("panic: {}", panic_message(&*payload)),
                });
            }
        };

        let inner = LibraryInstance {
            vtable: vtable_ptr,
            _library: library,
            name: plugin_id.to_string(),
            serial: Mutex::new(()),
        };
        let type_fn = inner.vtable().platform_type;
        let instance = inner.vtable().instance as *const c_void;
        let raw_type = panic::catch_unwind(|| type_fn(instance)).map_err(|payload| {
            PluginSystemError::FfiError {
                plugin_id: plugin_id.to_string(),
                operation: "platform_type".to_string(),
                message: format!("panic: {}", panic_message(&*payload)),
            }
        })?;
        let platform_type = FfiPlatformType::from_raw(raw_type)
            .map(PlatformType::from)
            .ok_or_else(|| PluginSystemError::FfiError {
                plugin_id: plugin_id.to_string(),
                operation: "platform_type".to_string(),
                message: format!("invalid platform type value {}", raw_type),
            })?;

        Ok(Self { inner: Arc::new(inner), platform_type })
    }
}

async fn run_blocking<F>(f: F) -> Result<(), PluginError>
where
    F: FnOnce() -> Result<(), PluginError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PluginError::ExecutionError(format!("callback task failed: {}", e)))?
}

fn c_reason(reason: &str) -> Result<CString, PluginError> {
    CString::new(reason).map_err(|e| PluginError::ExecutionError(format!("invalid reason string: {}", e)))
}

#[async_trait]
impl Platform for LibraryPlatform {
    fn platform_type(&self) -> PlatformType {
        self.platform_type
    }

    async fn on_start(&self, reason: &str) -> Result<(), PluginError> {
        let inner = Arc::clone(&self.inner);
        let reason = c_reason(reason)?;
        run_blocking(move || {
            inner
                .call("on_start", |vt| (vt.on_start)(vt.instance, reason.as_ptr()))
                .map_err(|e| PluginError::StartError(e.to_string()))
        })
        .await
    }

    async fn on_configure(&self) -> Result<(), PluginError> {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            inner
                .call("on_configure", |vt| (vt.on_configure)(vt.instance))
                .map_err(|e| PluginError::ConfigureError(e.to_string()))
        })
        .await
    }

    async fn on_shutdown(&self, reason: &str, remove_devices: bool) -> Result<(), PluginError> {
        let inner = Arc::clone(&self.inner);
        let reason = c_reason(reason)?;
        run_blocking(move || {
            inner
                .call("on_shutdown", |vt| {
                    (vt.on_shutdown)(vt.instance, reason.as_ptr(), remove_devices)
                })
                .map_err(|e| PluginError::ShutdownError(e.to_string()))
        })
        .await
    }

    fn registered_devices(&self) -> usize {
        self.inner.counter(self.inner.vtable().registered_devices)
    }

    fn added_devices(&self) -> usize {
        self.inner.counter(self.inner.vtable().added_devices)
    }
}

impl fmt::Debug for LibraryPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryPlatform")
            .field("name", &self.inner.name)
            .field("platform_type", &self.platform_type)
            .finish()
    }
}
