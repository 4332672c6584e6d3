//! A platform whose start callback outlives the host's transition timeout.
//! Its shutdown callback fails if it is entered while a start is still running.
use std::ffi::c_void;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

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
    starting: AtomicBool,
}

fn state<'a>(instance: *const c_void) -> &'a State {
    unsafe { &*(instance as *const State) }
}

extern "C-unwind" fn platform_type(_instance: *const c_void) -> u32 {
    1
}

extern "C-unwind" fn on_start(instance: *mut c_void, _reason: *const c_char) -> FfiResult {
    let state = state(instance);
    state.starting.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(400));
    state.starting.store(false, Ordering::SeqCst);
    FfiResult::Ok
}

extern "C-unwind" fn on_configure(_instance: *mut c_void) -> FfiResult {
    FfiResult::Ok
}

extern "C-unwind" fn on_shutdown(instance: *mut c_void, _reason: *const c_char, _remove: bool) -> FfiResult {
    if state(instance).starting.load(Ordering::SeqCst) {
        FfiResult::Err
    } else {
        FfiResult::Ok
    }
}

extern "C-unwind" fn registered_devices(_instance: *const c_void) -> u32 {
    0
}

extern "C-unwind" fn added_devices(_instance: *const c_void) -> u32 {
    0
}

extern "C-unwind" fn destroy(instance: *mut c_void) {
    if !instance.is_null() {
        drop(unsafe { Box::from_raw(instance as *mut State) });
    }
}

#[no_mangle]
pub extern "C-unwind" fn _platform_init(_config_json: *const c_char) -> *mut PlatformVTable {
    let state = Box::into_raw(Box::new(State { starting: AtomicBool::new(false) }));
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
