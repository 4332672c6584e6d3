//! C ABI shared by the host and dynamic platform libraries.
//!
//! A library exports [`PLATFORM_INIT_SYMBOL`](crate::kernel::constants::PLATFORM_INIT_SYMBOL)
//! with the signature of [`PlatformInitFn`]. It receives the plugin's config
//! snapshot as a JSON C string and returns a heap-allocated [`PlatformVTable`]
//! (allocated with `Box`), or null on failure. The host owns the vtable from
//! then on: it calls `destroy` on the instance and frees the vtable when the
//! platform is released.
use std::any::Any;
use std::ffi::c_void;
use std::os::raw::c_char;

use crate::plugin_system::traits::PlatformType;

/// Status code returned by vtable callbacks
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    Ok = 0,
    Err = 1,
    NullPointer = 2,
    Utf8Error = 3,
    Panic = 4,
}

/// Platform type as it crosses the boundary (a plain `u32`)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiPlatformType {
    Unknown = 0,
    AccessoryPlatform = 1,
    DynamicPlatform = 2,
}

impl FfiPlatformType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FfiPlatformType::Unknown),
            1 => Some(FfiPlatformType::AccessoryPlatform),
            2 => Some(FfiPlatformType::DynamicPlatform),
            _ => None,
        }
    }
}

impl From<FfiPlatformType> for PlatformType {
    fn from(value: FfiPlatformType) -> Self {
        match value {
            FfiPlatformType::Unknown => PlatformType::Unknown,
            FfiPlatformType::AccessoryPlatform => PlatformType::AccessoryPlatform,
            FfiPlatformType::DynamicPlatform => PlatformType::DynamicPlatform,
        }
    }
}

impl From<PlatformType> for FfiPlatformType {
    fn from(value: PlatformType) -> Self {
        match value {
            PlatformType::Unknown => FfiPlatformType::Unknown,
            PlatformType::AccessoryPlatform => FfiPlatformType::AccessoryPlatform,
            PlatformType::DynamicPlatform => FfiPlatformType::DynamicPlatform,
        }
    }
}

/// Function table describing one platform instance
#[repr(C)]
pub struct PlatformVTable {
    /// Opaque pointer to the plugin's own state
    pub instance: *mut c_void,
    /// A [`FfiPlatformType`] discriminant
    pub platform_type: extern "C-unwind" fn(instance: *const c_void) -> u32,
    pub on_start: extern "C-unwind" fn(instance: *mut c_void, reason: *const c_char) -> FfiResult,
    pub on_configure: extern "C-unwind" fn(instance: *mut c_void) -> FfiResult,
    pub on_shutdown: extern "C-unwind" fn(
        instance: *mut c_void,
        reason: *const c_char,
        remove_devices: bool,
    ) -> FfiResult,
    pub registered_devices: extern "C-unwind" fn(instance: *const c_void) -> u32,
    pub added_devices: extern "C-unwind" fn(instance: *const c_void) -> u32,
    /// Frees `instance`
    pub destroy: extern "C-unwind" fn(instance: *mut c_void),
}

/// Signature of the exported entry point
pub type PlatformInitFn = unsafe extern "C-unwind" fn(config_json: *const c_char) -> *mut PlatformVTable;

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic reason".to_string()
    }
}
