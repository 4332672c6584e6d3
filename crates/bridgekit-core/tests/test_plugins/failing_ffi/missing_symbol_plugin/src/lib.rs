use std::os::raw::c_char;

// The host looks for `_platform_init`; this library exports something else.
#[no_mangle]
pub extern "C-unwind" fn _platform_initialize(_config_json: *const c_char) -> *mut u8 {
    std::ptr::null_mut()
}
