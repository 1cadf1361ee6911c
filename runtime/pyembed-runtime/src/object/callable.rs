//! Registering host functions as Python callables, and calling objects.

use std::ffi::CString;
use std::ptr;

use pyembed_abi::{METH_NOARGS, METH_O, METH_VARARGS, PyMethodDef, PyObject};

use super::{AsPyPtr, PyRef, TypeCategory};
use crate::concurrency::{PyToken, gil_assert};
use crate::error::{EmbedError, Result};

/// Host entry point: `(self, args) -> new reference or null with an error set`.
pub type HostFn = unsafe extern "C" fn(*mut PyObject, *mut PyObject) -> *mut PyObject;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallFlags {
    /// `args` is a tuple.
    VarArgs,
    /// `args` is always null.
    NoArgs,
    /// `args` is the single positional argument.
    One,
}

impl CallFlags {
    fn bits(self) -> i32 {
        match self {
            Self::VarArgs => METH_VARARGS,
            Self::NoArgs => METH_NOARGS,
            Self::One => METH_O,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HostFunction {
    name: String,
    doc: Option<String>,
    flags: CallFlags,
    func: HostFn,
}

impl HostFunction {
    pub fn new(name: impl Into<String>, flags: CallFlags, func: HostFn) -> Self {
        Self {
            name: name.into(),
            doc: None,
            flags,
            func,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The runtime keeps pointers into the definition for as long as the
    /// function object exists, so it lives for the rest of the process.
    fn leak_def(&self) -> Result<*mut PyMethodDef> {
        let name = CString::new(self.name.as_str())?;
        let doc = self.doc.as_deref().map(CString::new).transpose()?;
        let def = PyMethodDef {
            ml_name: name.into_raw().cast_const(),
            ml_meth: Some(self.func),
            ml_flags: self.flags.bits(),
            ml_doc: doc.map_or(ptr::null(), |d| d.into_raw().cast_const()),
        };
        Ok(Box::into_raw(Box::new(def)))
    }
}

impl<'py> PyToken<'py> {
    /// Returns owned. `bound` is passed as `self` to every call.
    pub fn new_function(
        self,
        function: &HostFunction,
        bound: Option<&PyRef<'py>>,
    ) -> Result<PyRef<'py>> {
        gil_assert(&self);
        let def = function.leak_def()?;
        let bound = bound.map_or(ptr::null_mut(), AsPyPtr::as_ptr);
        log::debug!("registering host function {}", function.name());
        unsafe {
            PyRef::from_owned(
                self,
                (self.sym().PyCFunction_NewEx)(def, bound, ptr::null_mut()),
            )
        }
    }
}

impl<'py> PyRef<'py> {
    /// Returns owned. `args` must be a tuple when given.
    pub fn call(&self, args: Option<&PyRef<'py>>) -> Result<PyRef<'py>> {
        let py = self.py();
        gil_assert(&py);
        if let Some(args) = args {
            let found = args.classify();
            if found != TypeCategory::Tuple {
                return Err(EmbedError::TypeMismatch {
                    expected: "tuple",
                    found,
                });
            }
        }
        let args = args.map_or(ptr::null_mut(), AsPyPtr::as_ptr);
        unsafe { PyRef::from_owned(py, (py.sym().PyObject_CallObject)(self.as_ptr(), args)) }
    }

    /// Builds the argument tuple from `args` and calls.
    pub fn call_with(&self, args: Vec<PyRef<'py>>) -> Result<PyRef<'py>> {
        let tuple = self.py().new_tuple(args)?;
        self.call(Some(&tuple))
    }
}
