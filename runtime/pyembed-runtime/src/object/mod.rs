//! Reference-counted object handles.
//!
//! [`PyRef`] owns one strong reference and gives it back exactly once on
//! drop. [`Borrowed`] points at an object someone else keeps alive and never
//! touches the count.

pub mod callable;
pub mod classify;
pub mod containers;

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use pyembed_abi::PyObject;

use crate::concurrency::{PyToken, gil_assert};
use crate::error::{EmbedError, Result};

pub use callable::{CallFlags, HostFunction};
pub use classify::TypeCategory;

/// Anything that can hand out the raw object pointer.
pub trait AsPyPtr {
    fn as_ptr(&self) -> *mut PyObject;
}

pub struct PyRef<'py> {
    ptr: NonNull<PyObject>,
    py: PyToken<'py>,
}

impl<'py> PyRef<'py> {
    /// Takes ownership of a new reference. A null result is turned into the
    /// pending exception.
    ///
    /// # Safety
    /// `ptr` must be null or a new (owned) reference.
    pub unsafe fn from_owned(py: PyToken<'py>, ptr: *mut PyObject) -> Result<Self> {
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, py }),
            None => Err(py.take_error()),
        }
    }

    /// # Safety
    /// As for [`Self::from_owned`]; null means "absent" and sets no error.
    pub unsafe fn from_owned_opt(py: PyToken<'py>, ptr: *mut PyObject) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, py })
    }

    /// Gives the reference away, e.g. to a stealing call.
    pub fn into_ptr(self) -> *mut PyObject {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }

    pub fn py(&self) -> PyToken<'py> {
        self.py
    }

    pub fn borrow(&self) -> Borrowed<'_, 'py> {
        Borrowed {
            ptr: self.ptr,
            py: self.py,
            _owner: PhantomData,
        }
    }

    pub fn classify(&self) -> TypeCategory {
        self.py.classify(self.as_ptr())
    }

    /// Fails with [`EmbedError::TypeMismatch`] unless the object falls in `want`.
    pub fn expect_category(&self, want: TypeCategory) -> Result<()> {
        let found = self.classify();
        if found == want {
            Ok(())
        } else {
            Err(EmbedError::TypeMismatch {
                expected: want.name(),
                found,
            })
        }
    }
}

impl AsPyPtr for PyRef<'_> {
    fn as_ptr(&self) -> *mut PyObject {
        self.ptr.as_ptr()
    }
}

impl Clone for PyRef<'_> {
    fn clone(&self) -> Self {
        unsafe { (self.py.sym().Py_IncRef)(self.ptr.as_ptr()) };
        Self {
            ptr: self.ptr,
            py: self.py,
        }
    }
}

impl Drop for PyRef<'_> {
    fn drop(&mut self) {
        gil_assert(&self.py);
        unsafe { (self.py.sym().Py_DecRef)(self.ptr.as_ptr()) };
    }
}

impl fmt::Debug for PyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyRef")
            .field("ptr", &self.ptr)
            .field("category", &self.classify())
            .finish()
    }
}

/// A reference owned elsewhere: a container slot, a dict value, `self` in a
/// host callable. Valid while `'a` lasts.
#[derive(Copy, Clone)]
pub struct Borrowed<'a, 'py> {
    ptr: NonNull<PyObject>,
    py: PyToken<'py>,
    _owner: PhantomData<&'a PyObject>,
}

impl<'a, 'py> Borrowed<'a, 'py> {
    /// # Safety
    /// `ptr` must stay alive for `'a`.
    pub unsafe fn from_ptr(py: PyToken<'py>, ptr: *mut PyObject) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            py,
            _owner: PhantomData,
        })
    }

    /// Takes a strong reference of its own.
    pub fn to_owned(&self) -> PyRef<'py> {
        unsafe { (self.py.sym().Py_IncRef)(self.ptr.as_ptr()) };
        PyRef {
            ptr: self.ptr,
            py: self.py,
        }
    }

    pub fn classify(&self) -> TypeCategory {
        self.py.classify(self.as_ptr())
    }
}

impl AsPyPtr for Borrowed<'_, '_> {
    fn as_ptr(&self) -> *mut PyObject {
        self.ptr.as_ptr()
    }
}

impl fmt::Debug for Borrowed<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Borrowed").field("ptr", &self.ptr).finish()
    }
}
