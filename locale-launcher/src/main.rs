// Linux only. The C runtime provides process startup and calls `main`;
// everything after that goes through raw syscalls in the platform module.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![cfg_attr(test, allow(dead_code))]

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod platform;

#[cfg(not(target_os = "linux"))]
compile_error!("locale-launcher only supports Linux");

mod launch;
mod slots;

#[cfg(not(test))]
#[link(name = "c")]
extern "C" {}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    platform::exit(1);
}

// Referenced by the precompiled core in unoptimized builds. Never reached with panic=abort.
#[cfg(not(test))]
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn _Unwind_Resume() -> ! {
    platform::exit(1);
}

#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn rust_eh_personality() {}

#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn main(argc: i32, argv: *mut *const u8) -> i32 {
    unsafe { launch::run(argc, argv) }
}
