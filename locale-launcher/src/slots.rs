//! Build-time configuration embedded in the launcher binary.
//!
//! Each slot is a 16-byte tag followed by a NUL-padded value region, placed in
//! the `.launcher_slots` section. The tag never changes, so `finalize-launcher`
//! can locate a slot in a template or in an already finalized binary. Values come
//! either from `LAUNCHER_TARGET_PATH` / `LAUNCHER_ARG0` at compile time or from
//! patching the linked binary afterwards.

pub const TAG_SIZE: usize = 16;
pub const TARGET_SIZE: usize = 256;
pub const ARG0_SIZE: usize = 64;

/// Program name handed to the target when the arg0 slot is unset.
pub const DEFAULT_ARG0: &[u8] = b"ctffind\0";

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Slot<const N: usize> {
    tag: [u8; TAG_SIZE],
    value: [u8; N],
}

impl<const N: usize> Slot<N> {
    const fn new(tag: &[u8; TAG_SIZE], value: Option<&str>) -> Self {
        let src: &[u8] = match value {
            Some(v) => v.as_bytes(),
            None => b"",
        };
        // The final byte stays NUL so the value is always a C string.
        assert!(src.len() < N, "launcher slot value is too long");
        let mut out = [0u8; N];
        let mut i = 0;
        while i < src.len() {
            out[i] = src[i];
            i += 1;
        }
        Self { tag: *tag, value: out }
    }

    /// The value including its NUL terminator, or `None` when unset.
    pub fn value(&self) -> Option<&[u8]> {
        let len = self.value.iter().position(|&b| b == 0)?;
        if len == 0 {
            return None;
        }
        Some(&self.value[..=len])
    }
}

#[used]
#[link_section = ".launcher_slots"]
static mut TARGET_SLOT: Slot<TARGET_SIZE> =
    Slot::new(b"LAUNCHER_TARGET=", option_env!("LAUNCHER_TARGET_PATH"));

#[used]
#[link_section = ".launcher_slots"]
static mut ARG0_SLOT: Slot<ARG0_SIZE> =
    Slot::new(b"LAUNCHER_ARG0=\0\0", option_env!("LAUNCHER_ARG0"));

/// Copy of both slots as they are in the running binary.
pub struct Slots {
    target: Slot<TARGET_SIZE>,
    arg0: Slot<ARG0_SIZE>,
}

impl Slots {
    pub fn load() -> Self {
        // Volatile so the template contents are never folded into the code.
        unsafe {
            Self {
                target: core::ptr::read_volatile(core::ptr::addr_of!(TARGET_SLOT)),
                arg0: core::ptr::read_volatile(core::ptr::addr_of!(ARG0_SLOT)),
            }
        }
    }

    /// NUL-terminated path of the binary to exec; `None` for a template.
    pub fn target(&self) -> Option<&[u8]> {
        self.target.value()
    }

    /// NUL-terminated program name for `argv[0]`.
    pub fn arg0(&self) -> &[u8] {
        self.arg0.value().unwrap_or(DEFAULT_ARG0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(target: Option<&str>, arg0: Option<&str>) -> Slots {
        Slots {
            target: Slot::new(b"LAUNCHER_TARGET=", target),
            arg0: Slot::new(b"LAUNCHER_ARG0=\0\0", arg0),
        }
    }

    #[test]
    fn unset_target_is_a_template() {
        assert_eq!(slots(None, None).target(), None);
        assert_eq!(slots(Some(""), None).target(), None);
    }

    #[test]
    fn target_is_nul_terminated() {
        let s = slots(Some("/opt/ctffind/bin/ctffind"), None);
        assert_eq!(s.target(), Some(&b"/opt/ctffind/bin/ctffind\0"[..]));
    }

    #[test]
    fn arg0_defaults_to_ctffind() {
        assert_eq!(slots(Some("/bin/true"), None).arg0(), b"ctffind\0");
        assert_eq!(slots(Some("/bin/true"), Some("ctffind4")).arg0(), b"ctffind4\0");
    }

    #[test]
    fn longest_value_keeps_terminator() {
        let long = "x".repeat(TARGET_SIZE - 1);
        let s = slots(Some(&long), None);
        assert_eq!(s.target().map(<[u8]>::len), Some(TARGET_SIZE));
    }

    #[test]
    #[should_panic(expected = "too long")]
    fn oversized_value_is_rejected() {
        let long = "x".repeat(ARG0_SIZE);
        slots(None, Some(&long));
    }

    #[test]
    fn slot_layout_is_tag_then_value() {
        assert_eq!(core::mem::size_of::<Slot<TARGET_SIZE>>(), TAG_SIZE + TARGET_SIZE);
        assert_eq!(core::mem::size_of::<Slot<ARG0_SIZE>>(), TAG_SIZE + ARG0_SIZE);
    }
}
