use crate::platform;
use crate::slots::Slots;

/// The whole environment the target sees. Nothing is inherited.
pub const LOCALE_ENV: &[u8] = b"LC_ALL=C\0";

/// Exit status of a template launcher, one whose target slot was never filled.
pub const UNCONFIGURED_EXIT: i32 = 127;

/// The target could not be started. Carries the errno from `execve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchFailure {
    errno: i32,
}

impl LaunchFailure {
    /// From the raw syscall return value (`-errno`).
    pub fn from_raw(ret: isize) -> Self {
        let errno = ret
            .checked_neg()
            .and_then(|e| i32::try_from(e).ok())
            .unwrap_or(0);
        Self { errno }
    }

    pub fn errno(self) -> i32 {
        self.errno
    }

    /// Status reported to the parent: the errno itself when it fits in an exit code.
    pub fn exit_code(self) -> i32 {
        match self.errno() {
            errno @ 1..=255 => errno,
            _ => 1,
        }
    }
}

/// Execs the configured target with `argv[0]` renamed and only `LC_ALL=C` set.
/// Returns the exit status only if that fails.
///
/// # Safety
///
/// `argv` must be the NULL-terminated argument vector the C runtime passed to
/// `main`, with `argc` entries.
pub unsafe fn run(argc: i32, argv: *mut *const u8) -> i32 {
    let slots = Slots::load();
    let Some(target) = slots.target() else {
        return UNCONFIGURED_EXIT;
    };

    let mut bare: [*const u8; 2] = [core::ptr::null(); 2];
    let argv = forward_args(argc, argv, &mut bare, slots.arg0());
    let envp: [*const u8; 2] = [LOCALE_ENV.as_ptr(), core::ptr::null()];

    let ret = platform::execve(target.as_ptr(), argv.cast_const(), envp.as_ptr());
    LaunchFailure::from_raw(ret).exit_code()
}

/// Points `argv[0]` at `name` and returns the vector to hand to `execve`.
///
/// Entries after the first are forwarded by pointer, untouched. An empty vector
/// has no slot for the name, so `bare` is filled in as `[name, NULL]` instead.
unsafe fn forward_args(
    argc: i32,
    argv: *mut *const u8,
    bare: &mut [*const u8; 2],
    name: &[u8],
) -> *mut *const u8 {
    if argc < 1 || argv.is_null() {
        bare[0] = name.as_ptr();
        bare[1] = core::ptr::null();
        return bare.as_mut_ptr();
    }
    *argv = name.as_ptr();
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    fn collect(argv: *const *const u8) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        unsafe {
            while !(*argv.add(i)).is_null() {
                let s = CStr::from_ptr((*argv.add(i)).cast());
                out.push(s.to_string_lossy().into_owned());
                i += 1;
            }
        }
        out
    }

    fn forward(input: &[&str], name: &[u8]) -> Vec<String> {
        let owned: Vec<CString> = input.iter().map(|s| CString::new(*s).unwrap()).collect();
        let mut ptrs: Vec<*const u8> = owned.iter().map(|s| s.as_ptr().cast()).collect();
        ptrs.push(std::ptr::null());
        let mut bare = [std::ptr::null(); 2];
        let argv = unsafe {
            forward_args(input.len() as i32, ptrs.as_mut_ptr(), &mut bare, name)
        };
        collect(argv)
    }

    #[test]
    fn program_name_is_replaced() {
        let got = forward(&["anything", "-i", "in.mrc", "-o", "out.txt"], b"ctffind\0");
        assert_eq!(got, ["ctffind", "-i", "in.mrc", "-o", "out.txt"]);
    }

    #[test]
    fn length_and_tail_are_preserved() {
        for input in [
            &["./wrapper"][..],
            &["/usr/bin/ctffind", ""][..],
            &["x", "--flag=a b", "ünïcode", "--", "-"][..],
        ] {
            let got = forward(input, b"ctffind\0");
            assert_eq!(got.len(), input.len());
            assert_eq!(got[0], "ctffind");
            assert_eq!(&got[1..], &input[1..]);
        }
    }

    #[test]
    fn empty_argv_gets_program_name_only() {
        let mut ptrs: [*const u8; 1] = [std::ptr::null()];
        let mut bare = [std::ptr::null(); 2];
        let argv = unsafe { forward_args(0, ptrs.as_mut_ptr(), &mut bare, b"ctffind\0") };
        assert_eq!(collect(argv), ["ctffind"]);
        // The caller's terminator is left alone.
        assert!(ptrs[0].is_null());
    }

    #[test]
    fn environment_is_exactly_c_locale() {
        let s = CStr::from_bytes_with_nul(LOCALE_ENV).unwrap();
        assert_eq!(s.to_str().unwrap(), "LC_ALL=C");
    }

    #[test]
    fn failure_exit_code_is_errno() {
        assert_eq!(LaunchFailure::from_raw(-2).exit_code(), 2); // ENOENT
        assert_eq!(LaunchFailure::from_raw(-13).exit_code(), 13); // EACCES
        assert_eq!(LaunchFailure::from_raw(-8).errno(), 8); // ENOEXEC
    }

    #[test]
    fn unrepresentable_errno_still_fails() {
        assert_eq!(LaunchFailure::from_raw(-4096).exit_code(), 1);
        assert_eq!(LaunchFailure::from_raw(0).exit_code(), 1);
        assert_eq!(LaunchFailure::from_raw(isize::MIN).exit_code(), 1);
    }
}
