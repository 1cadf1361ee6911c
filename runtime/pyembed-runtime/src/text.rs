//! Conversions between host strings and the runtime's locale/wide strings.

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr::NonNull;

use pyembed_abi::WChar;

use crate::error::{EmbedError, Result};
use crate::loader::Symbols;

/// Longest string `encode_locale` will copy back.
pub const MAX_LOCALE_STRING: usize = 10 * 1024 * 1024;

/// Wide string produced by `Py_DecodeLocale`, released with `PyMem_RawFree`.
pub struct WideString<'rt> {
    ptr: NonNull<WChar>,
    sym: &'rt Symbols,
}

impl<'rt> WideString<'rt> {
    /// Only valid once the runtime is pre-initialized.
    pub fn decode(sym: &'rt Symbols, value: &CStr) -> Result<Self> {
        let mut error_pos = 0usize;
        let raw = unsafe { (sym.Py_DecodeLocale)(value.as_ptr(), &mut error_pos) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            EmbedError::InvalidConfig(format!(
                "cannot decode {:?} (error at byte {error_pos})",
                value.to_string_lossy()
            ))
        })?;
        Ok(Self { ptr, sym })
    }

    pub fn as_ptr(&self) -> *const WChar {
        self.ptr.as_ptr()
    }

    /// Back to a host string through `Py_EncodeLocale`.
    pub fn encode(&self) -> Result<String> {
        encode_locale(self.sym, self.as_ptr())
    }
}

impl Drop for WideString<'_> {
    fn drop(&mut self) {
        unsafe { (self.sym.PyMem_RawFree)(self.ptr.as_ptr().cast()) };
    }
}

pub fn encode_locale(sym: &Symbols, wide: *const WChar) -> Result<String> {
    if wide.is_null() {
        return Ok(String::new());
    }
    let mut error_pos = 0usize;
    let raw = unsafe { (sym.Py_EncodeLocale)(wide, &mut error_pos) };
    if raw.is_null() {
        return Err(EmbedError::InvalidConfig(format!(
            "cannot encode wide string (error at character {error_pos})"
        )));
    }
    let bytes = unsafe { CStr::from_ptr(raw) }.to_bytes();
    let len = bytes.len().min(MAX_LOCALE_STRING);
    let out = String::from_utf8_lossy(&bytes[..len]).into_owned();
    unsafe { (sym.PyMem_Free)(raw.cast()) };
    Ok(out)
}

#[cfg(unix)]
pub fn path_cstring(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

#[cfg(not(unix))]
pub fn path_cstring(path: &Path) -> Result<CString> {
    Ok(CString::new(path.to_string_lossy().as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_keeps_bytes() {
        let c = path_cstring(Path::new("/tmp/site packages")).unwrap();
        assert_eq!(c.as_bytes(), b"/tmp/site packages");
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = path_cstring(Path::new("/tmp/a\0b")).unwrap_err();
        assert!(matches!(err, EmbedError::Nul(_)));
    }
}
