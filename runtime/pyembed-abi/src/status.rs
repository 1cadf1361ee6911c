use libc::{c_char, c_int};

pub const STATUS_TYPE_OK: c_int = 0;
pub const STATUS_TYPE_ERROR: c_int = 1;
pub const STATUS_TYPE_EXIT: c_int = 2;

/// `PyStatus`, returned by value from the initialization entry points.
///
/// `func` and `err_msg` point into memory owned by the runtime and stay valid
/// only until the next foreign call.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct PyStatus {
    pub kind: c_int,
    pub func: *const c_char,
    pub err_msg: *const c_char,
    pub exitcode: c_int,
}

impl PyStatus {
    pub const fn ok() -> Self {
        Self {
            kind: STATUS_TYPE_OK,
            func: std::ptr::null(),
            err_msg: std::ptr::null(),
            exitcode: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == STATUS_TYPE_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn status_layout_matches_c() {
        assert_eq!(size_of::<PyStatus>(), 32);
        assert_eq!(offset_of!(PyStatus, kind), 0);
        assert_eq!(offset_of!(PyStatus, func), 8);
        assert_eq!(offset_of!(PyStatus, err_msg), 16);
        assert_eq!(offset_of!(PyStatus, exitcode), 24);
    }

    #[test]
    fn ok_status_is_ok() {
        assert!(PyStatus::ok().is_ok());
    }
}
