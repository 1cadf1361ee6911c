use std::ffi::CStr;

use libc::c_char;
use pyembed_abi::{PyStatus, STATUS_TYPE_ERROR, STATUS_TYPE_EXIT, STATUS_TYPE_OK};

use crate::error::{EmbedError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Ok,
    Error,
    Exit,
}

/// Owned copy of a `PyStatus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub func: Option<String>,
    pub message: Option<String>,
    pub exit_code: i32,
}

impl Status {
    /// Copies the strings out of `raw` before anything else can invalidate them.
    ///
    /// # Safety
    /// `func` and `err_msg` must be null or valid C strings.
    pub unsafe fn from_raw(raw: &PyStatus) -> Self {
        let kind = match raw.kind {
            STATUS_TYPE_OK => StatusKind::Ok,
            STATUS_TYPE_EXIT => StatusKind::Exit,
            STATUS_TYPE_ERROR => StatusKind::Error,
            // Unknown tags are never success.
            _ => StatusKind::Error,
        };
        Self {
            kind,
            func: unsafe { copy_c_str(raw.func) },
            message: unsafe { copy_c_str(raw.err_msg) },
            exit_code: raw.exitcode,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == StatusKind::Ok
    }

    pub fn into_result(self) -> Result<()> {
        match self.kind {
            StatusKind::Ok => Ok(()),
            StatusKind::Exit => Err(EmbedError::ExitRequested {
                code: self.exit_code,
            }),
            StatusKind::Error => Err(EmbedError::Status {
                func: self.func,
                message: self.message,
            }),
        }
    }
}

unsafe fn copy_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: i32, func: &'static CStr, msg: &'static CStr, code: i32) -> PyStatus {
        PyStatus {
            kind,
            func: func.as_ptr(),
            err_msg: msg.as_ptr(),
            exitcode: code,
        }
    }

    #[test]
    fn ok_status_has_no_strings() {
        let status = unsafe { Status::from_raw(&PyStatus::ok()) };
        assert!(status.is_ok());
        assert_eq!(status.func, None);
        assert_eq!(status.message, None);
        assert!(status.into_result().is_ok());
    }

    #[test]
    fn error_status_copies_message() {
        let status = unsafe { Status::from_raw(&raw(1, c"init", c"bad allocator", 0)) };
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.message.as_deref(), Some("bad allocator"));
        match status.into_result() {
            Err(EmbedError::Status { func, message }) => {
                assert_eq!(func.as_deref(), Some("init"));
                assert_eq!(message.as_deref(), Some("bad allocator"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn exit_status_carries_code() {
        let status = unsafe { Status::from_raw(&raw(2, c"main", c"", 7)) };
        assert_eq!(status.kind, StatusKind::Exit);
        assert_eq!(status.into_result().unwrap_err().exit_code(), Some(7));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let status = unsafe { Status::from_raw(&raw(9, c"f", c"m", 0)) };
        assert_eq!(status.kind, StatusKind::Error);
    }
}
