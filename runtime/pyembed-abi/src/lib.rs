//! Binary layouts of the CPython 3.12 embedding ABI.
//! Every struct here is `#[repr(C)]` with field order pinned to the 3.12 headers.

pub mod config;
pub mod flags;
pub mod interp;
pub mod object;
pub mod status;

pub use config::{
    MemAllocator, OptimizeLevel, PyConfig, PyPreConfig, PyWideStringList, WChar,
};
pub use interp::{GilMode, PyInterpreterConfig};
pub use object::{
    METH_NOARGS, METH_O, METH_VARARGS, PyCFunction, PyInterpreterState, PyMethodDef, PyObject,
    PyThreadState, PyTypeObject, StartToken,
};
pub use status::{PyStatus, STATUS_TYPE_ERROR, STATUS_TYPE_EXIT, STATUS_TYPE_OK};

/// Major.minor prefix `Py_GetVersion()` must report.
pub const SUPPORTED_VERSION: &str = "3.12";

/// `PyGILState_STATE`.
pub type PyGILStateState = libc::c_int;
pub const PYGILSTATE_LOCKED: PyGILStateState = 0;
pub const PYGILSTATE_UNLOCKED: PyGILStateState = 1;
