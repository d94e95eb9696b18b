// Raw syscalls, no libc wrappers. Failures come back as -errno.

#[cfg(target_arch = "x86_64")]
mod syscall_numbers {
    pub const SYS_EXECVE: usize = 59;
    pub const SYS_EXIT_GROUP: usize = 231;
}

#[cfg(target_arch = "aarch64")]
mod syscall_numbers {
    pub const SYS_EXECVE: usize = 221;
    pub const SYS_EXIT_GROUP: usize = 94;
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("locale-launcher supports x86_64 and aarch64 only");

use syscall_numbers::*;

#[cfg(target_arch = "x86_64")]
pub fn exit(code: i32) -> ! {
    unsafe {
        core::arch::asm!(
            "syscall",
            in("rax") SYS_EXIT_GROUP,
            in("rdi") code,
            options(noreturn)
        );
    }
}

#[cfg(target_arch = "aarch64")]
pub fn exit(code: i32) -> ! {
    unsafe {
        core::arch::asm!(
            "svc #0",
            in("x8") SYS_EXIT_GROUP,
            in("x0") code,
            options(noreturn)
        );
    }
}

/// Replaces the process image. Only returns on failure, with `-errno`.
///
/// # Safety
///
/// `filename` must be a NUL-terminated string; `argv` and `envp` must be
/// NULL-terminated arrays of NUL-terminated strings.
#[cfg(target_arch = "x86_64")]
pub unsafe fn execve(filename: *const u8, argv: *const *const u8, envp: *const *const u8) -> isize {
    let ret: isize;
    core::arch::asm!(
        "syscall",
        in("rax") SYS_EXECVE,
        in("rdi") filename,
        in("rsi") argv,
        in("rdx") envp,
        lateout("rax") ret,
        lateout("rcx") _,
        lateout("r11") _,
    );
    ret
}

/// Replaces the process image. Only returns on failure, with `-errno`.
///
/// # Safety
///
/// `filename` must be a NUL-terminated string; `argv` and `envp` must be
/// NULL-terminated arrays of NUL-terminated strings.
#[cfg(target_arch = "aarch64")]
pub unsafe fn execve(filename: *const u8, argv: *const *const u8, envp: *const *const u8) -> isize {
    let ret: isize;
    core::arch::asm!(
        "svc #0",
        in("x8") SYS_EXECVE,
        in("x0") filename,
        in("x1") argv,
        in("x2") envp,
        lateout("x0") ret,
    );
    ret
}
