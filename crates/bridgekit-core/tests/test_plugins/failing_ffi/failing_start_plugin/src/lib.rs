//! A platform whose start callback always fails. Mirrors the host's vtable layout.
use std::ffi::c_void;
use std::os::raw::c_char;

#[repr(C)]
#[allow(dead_code)]
pub enum FfiResult {
    Ok = 0,
    Err = 1,
}

#[repr(C)]
pub struct PlatformVTable {
    pub instance: *mut c_void,
    pub platform_type: extern "C-unwind" fn(*const c_void) -> u32,
    pub on_start: extern "C-unwind" fn(*mut c_void, *const c_char) -> FfiResult,
    pub on_configure: extern "C-unwind" fn(*mut c_void) -> FfiResult,
    pub on_shutdown: extern "C-unwind" fn(*mut c_void, *const c_char, bool) -> FfiResult,
    pub registered_devices: extern "C-unwind" fn(*const c_void) -> u32,
    pub added_devices: extern "C-unwind" fn(*const c_void) -> u32,
    pub destroy: extern "C-unwind" fn(*mut c_void),
}

struct State {
    devices: u32,
}

extern "C-unwind" fn platform_type(_instance: *const c_void) -> u32 {
    2
}

extern "C-unwind" fn on_start(_instance: *mut c_void, _reason: *const c_char) -> FfiResult {
    FfiResult::Err
}

extern "C-unwind" fn on_configure(_instance: *mut c_void) -> FfiResult {
    FfiResult::Ok
}

extern "C-unwind" fn on_shutdown(_instance: *mut c_void, _reason: *const c_char, _remove: bool) -> FfiResult {
    FfiResult::Ok
}

extern "C-unwind" fn registered_devices(instance: *const c_void) -> u32 {
    unsafe { (*(instance as *const State)).devices }
}

extern "C-unwind" fn added_devices(instance: *const c_void) -> u32 {
    unsafe { (*(instance as *const State)).devices }
}

extern "C-unwind" fn destroy(instance: *mut c_void) {
    if !instance.is_null() {
        drop(unsafe { Box::from_raw(instance as *mut State) });
    }
}

#[no_mangle]
pub extern "C-unwind" fn _platform_init(_config_json: *const c_char) -> *mut PlatformVTable {
    let state = Box::into_raw(Box::new(State { devices: 3 }));
    Box::into_raw(Box::new(PlatformVTable {
        instance: state as *mut c_void,
        platform_type,
        on_start,
        on_configure,
        on_shutdown,
        registered_devices,
        added_devices,
        destroy,
    }))
}
