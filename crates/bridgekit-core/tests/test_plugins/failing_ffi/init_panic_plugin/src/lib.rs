use std::os::raw::c_char;

#[no_mangle]
pub extern "C-unwind" fn _platform_init(_config_json: *const c_char) -> *mut u8 {
    panic!("Platform initialization deliberately failed!");
}
