//! Symbol table: the loaded libpython and its typed entry points.

use std::ffi::{CStr, c_void};
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};

use libc::{c_char, c_int, c_long, c_ulong};
use pyembed_abi::{
    PyConfig, PyGILStateState, PyInterpreterState, PyMethodDef, PyObject, PyPreConfig,
    PyThreadState, PyTypeObject, SUPPORTED_VERSION, WChar,
};

use crate::error::{EmbedError, Result};

/// Platform file name of the shared runtime library.
#[cfg(target_os = "macos")]
pub const LIBRARY_NAME: &str = "libpython3.12.dylib";
#[cfg(not(target_os = "macos"))]
pub const LIBRARY_NAME: &str = "libpython3.12.so.1.0";

/// The mapping stays for the life of the process, even after this handle drops.
pub struct Library {
    inner: ManuallyDrop<libloading::Library>,
    path: PathBuf,
}

impl Library {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = open_global(path).map_err(|err| EmbedError::LibraryLoad {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        log::debug!("opened {}", path.display());
        Ok(Self {
            inner: ManuallyDrop::new(inner),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves `name` as a value of type `T`, normally an `extern "C" fn`.
    ///
    /// # Safety
    /// `T` must match the symbol's real type.
    pub unsafe fn resolve<T: Copy>(&self, name: &str) -> Result<T> {
        let symbol = unsafe { self.inner.get::<T>(name.as_bytes()) }.map_err(|_| {
            EmbedError::SymbolNotFound {
                symbol: name.to_string(),
                library: self.path.display().to_string(),
            }
        })?;
        Ok(*symbol)
    }

    /// Raw address of `name`, for callers that build their own call frame.
    pub fn address(&self, name: &str) -> Result<*const c_void> {
        let func: unsafe extern "C" fn() = unsafe { self.resolve(name)? };
        Ok(func as *const c_void)
    }
}

#[cfg(unix)]
fn open_global(path: &Path) -> std::result::Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
    // Extension modules resolve Py* symbols against the global namespace.
    let lib = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL)? };
    Ok(lib.into())
}

#[cfg(not(unix))]
fn open_global(path: &Path) -> std::result::Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

macro_rules! py_symbols {
    ($($field:ident: fn($($arg:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        /// Typed handles for every scalar- or pointer-returning entry point.
        #[allow(non_snake_case)]
        pub struct Symbols {
            $(pub $field: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
        }

        impl Symbols {
            pub fn resolve(lib: &Library) -> Result<Self> {
                Ok(Self {
                    $($field: unsafe { lib.resolve(stringify!($field))? },)*
                })
            }
        }
    };
}

py_symbols! {
    Py_GetVersion: fn() -> *const c_char;
    Py_IsInitialized: fn() -> c_int;
    Py_FinalizeEx: fn() -> c_int;
    Py_EndInterpreter: fn(*mut PyThreadState);
    Py_DecodeLocale: fn(*const c_char, *mut usize) -> *mut WChar;
    Py_EncodeLocale: fn(*const WChar, *mut usize) -> *mut c_char;
    PyMem_Free: fn(*mut c_void);
    PyMem_RawFree: fn(*mut c_void);

    PyPreConfig_InitPythonConfig: fn(*mut PyPreConfig);
    PyPreConfig_InitIsolatedConfig: fn(*mut PyPreConfig);
    PyConfig_InitPythonConfig: fn(*mut PyConfig);
    PyConfig_InitIsolatedConfig: fn(*mut PyConfig);
    PyConfig_Clear: fn(*mut PyConfig);

    PyGILState_Check: fn() -> c_int;
    PyGILState_Ensure: fn() -> PyGILStateState;
    PyGILState_Release: fn(PyGILStateState);
    PyEval_SaveThread: fn() -> *mut PyThreadState;
    PyEval_RestoreThread: fn(*mut PyThreadState);

    PyThreadState_Get: fn() -> *mut PyThreadState;
    PyThreadState_New: fn(*mut PyInterpreterState) -> *mut PyThreadState;
    PyThreadState_Clear: fn(*mut PyThreadState);
    PyThreadState_DeleteCurrent: fn();
    PyThreadState_GetInterpreter: fn(*mut PyThreadState) -> *mut PyInterpreterState;
    PyInterpreterState_GetID: fn(*mut PyInterpreterState) -> i64;

    PyRun_SimpleString: fn(*const c_char) -> c_int;
    PyRun_String: fn(*const c_char, c_int, *mut PyObject, *mut PyObject) -> *mut PyObject;
    PyImport_ImportModule: fn(*const c_char) -> *mut PyObject;
    PyModule_New: fn(*const c_char) -> *mut PyObject;
    PyModule_AddObjectRef: fn(*mut PyObject, *const c_char, *mut PyObject) -> c_int;

    Py_IncRef: fn(*mut PyObject);
    Py_DecRef: fn(*mut PyObject);
    PyObject_Type: fn(*mut PyObject) -> *mut PyObject;
    PyObject_Str: fn(*mut PyObject) -> *mut PyObject;
    PyObject_CallObject: fn(*mut PyObject, *mut PyObject) -> *mut PyObject;
    PyType_GetFlags: fn(*mut PyTypeObject) -> c_ulong;
    PyType_GetName: fn(*mut PyTypeObject) -> *mut PyObject;
    PyType_IsSubtype: fn(*mut PyTypeObject, *mut PyTypeObject) -> c_int;
    PyIter_Check: fn(*mut PyObject) -> c_int;
    PyCallable_Check: fn(*mut PyObject) -> c_int;
    PyCFunction_NewEx: fn(*mut PyMethodDef, *mut PyObject, *mut PyObject) -> *mut PyObject;

    PyErr_Occurred: fn() -> *mut PyObject;
    PyErr_GetRaisedException: fn() -> *mut PyObject;
    PyErr_Clear: fn();
    PyErr_Print: fn();

    PyBool_FromLong: fn(c_long) -> *mut PyObject;
    PyLong_FromLongLong: fn(i64) -> *mut PyObject;
    PyLong_FromUnsignedLongLong: fn(u64) -> *mut PyObject;
    PyLong_AsLongLong: fn(*mut PyObject) -> i64;
    PyFloat_FromDouble: fn(f64) -> *mut PyObject;
    PyFloat_AsDouble: fn(*mut PyObject) -> f64;

    PyTuple_New: fn(isize) -> *mut PyObject;
    PyTuple_Size: fn(*mut PyObject) -> isize;
    PyTuple_GetItem: fn(*mut PyObject, isize) -> *mut PyObject;
    PyTuple_SetItem: fn(*mut PyObject, isize, *mut PyObject) -> c_int;

    PyList_New: fn(isize) -> *mut PyObject;
    PyList_Size: fn(*mut PyObject) -> isize;
    PyList_GetItem: fn(*mut PyObject, isize) -> *mut PyObject;
    PyList_SetItem: fn(*mut PyObject, isize, *mut PyObject) -> c_int;
    PyList_Append: fn(*mut PyObject, *mut PyObject) -> c_int;
    PyList_Insert: fn(*mut PyObject, isize, *mut PyObject) -> c_int;

    PyDict_New: fn() -> *mut PyObject;
    PyDict_Size: fn(*mut PyObject) -> isize;
    PyDict_Clear: fn(*mut PyObject);
    PyDict_GetItem: fn(*mut PyObject, *mut PyObject) -> *mut PyObject;
    PyDict_GetItemString: fn(*mut PyObject, *const c_char) -> *mut PyObject;
    PyDict_SetItem: fn(*mut PyObject, *mut PyObject, *mut PyObject) -> c_int;
    PyDict_SetItemString: fn(*mut PyObject, *const c_char, *mut PyObject) -> c_int;
    PyDictProxy_New: fn(*mut PyObject) -> *mut PyObject;

    PyBytes_FromStringAndSize: fn(*const c_char, isize) -> *mut PyObject;
    PyBytes_AsString: fn(*mut PyObject) -> *mut c_char;
    PyBytes_Size: fn(*mut PyObject) -> isize;
    PyByteArray_FromStringAndSize: fn(*const c_char, isize) -> *mut PyObject;
    PyUnicode_FromStringAndSize: fn(*const c_char, isize) -> *mut PyObject;
    PyUnicode_AsUTF8AndSize: fn(*mut PyObject, *mut isize) -> *const c_char;
}

impl Symbols {
    /// Fails unless the loaded library reports the supported major.minor.
    pub fn check_version(&self) -> Result<String> {
        let raw = unsafe { (self.Py_GetVersion)() };
        if raw.is_null() {
            return Err(EmbedError::VersionMismatch {
                expected: SUPPORTED_VERSION,
                found: String::new(),
            });
        }
        let found = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        if !version_supported(&found) {
            return Err(EmbedError::VersionMismatch {
                expected: SUPPORTED_VERSION,
                found,
            });
        }
        Ok(found)
    }
}

fn version_supported(version: &str) -> bool {
    version
        .strip_prefix(SUPPORTED_VERSION)
        .is_some_and(|rest| rest.starts_with('.'))
}
