//! Constructors, accessors and extractors for the builtin types.
//!
//! "Returns owned" means the result is a [`PyRef`] the caller now holds;
//! "returns borrowed" means a [`Borrowed`] tied to the container it came from.

use std::ffi::{CString, c_char, c_long};

use pyembed_abi::PyObject;

use super::{AsPyPtr, Borrowed, PyRef, TypeCategory};
use crate::concurrency::{PyToken, gil_assert};
use crate::error::{EmbedError, Result};

fn ssize(len: usize) -> Result<isize> {
    isize::try_from(len).map_err(|_| EmbedError::InvalidConfig(format!("length {len} overflows")))
}

fn check(rc: i32, py: PyToken<'_>) -> Result<()> {
    if rc < 0 { Err(py.take_error()) } else { Ok(()) }
}

impl<'py> PyToken<'py> {
    /// Returns owned.
    pub fn none(self) -> Result<PyRef<'py>> {
        let ptr = self.runtime().none_ptr();
        unsafe { (self.sym().Py_IncRef)(ptr) };
        unsafe { PyRef::from_owned(self, ptr) }
    }

    /// Returns owned.
    pub fn int(self, value: i64) -> Result<PyRef<'py>> {
        gil_assert(&self);
        unsafe { PyRef::from_owned(self, (self.sym().PyLong_FromLongLong)(value)) }
    }

    /// Returns owned.
    pub fn uint(self, value: u64) -> Result<PyRef<'py>> {
        unsafe { PyRef::from_owned(self, (self.sym().PyLong_FromUnsignedLongLong)(value)) }
    }

    /// Returns owned.
    pub fn float(self, value: f64) -> Result<PyRef<'py>> {
        unsafe { PyRef::from_owned(self, (self.sym().PyFloat_FromDouble)(value)) }
    }

    /// Returns owned.
    pub fn bool(self, value: bool) -> Result<PyRef<'py>> {
        unsafe { PyRef::from_owned(self, (self.sym().PyBool_FromLong)(c_long::from(value))) }
    }

    /// Returns owned.
    pub fn str(self, value: &str) -> Result<PyRef<'py>> {
        let len = ssize(value.len())?;
        unsafe {
            PyRef::from_owned(
                self,
                (self.sym().PyUnicode_FromStringAndSize)(value.as_ptr().cast(), len),
            )
        }
    }

    /// Returns owned.
    pub fn bytes(self, value: &[u8]) -> Result<PyRef<'py>> {
        let len = ssize(value.len())?;
        unsafe {
            PyRef::from_owned(
                self,
                (self.sym().PyBytes_FromStringAndSize)(value.as_ptr().cast(), len),
            )
        }
    }

    /// Returns owned.
    pub fn bytearray(self, value: &[u8]) -> Result<PyRef<'py>> {
        let len = ssize(value.len())?;
        unsafe {
            PyRef::from_owned(
                self,
                (self.sym().PyByteArray_FromStringAndSize)(value.as_ptr().cast(), len),
            )
        }
    }

    /// Returns owned. An empty list.
    pub fn new_list(self) -> Result<PyRef<'py>> {
        gil_assert(&self);
        unsafe { PyRef::from_owned(self, (self.sym().PyList_New)(0)) }
    }

    /// Returns owned. The items move into the list.
    pub fn list_from<I>(self, items: I) -> Result<PyRef<'py>>
    where
        I: IntoIterator<Item = PyRef<'py>>,
    {
        let list = self.new_list()?;
        for item in items {
            self.append(&list, &item)?;
        }
        Ok(list)
    }

    /// Returns owned. The items move into the tuple.
    pub fn new_tuple(self, items: Vec<PyRef<'py>>) -> Result<PyRef<'py>> {
        gil_assert(&self);
        let sym = self.sym();
        let tuple = unsafe { PyRef::from_owned(self, (sym.PyTuple_New)(ssize(items.len())?))? };
        for (index, item) in items.into_iter().enumerate() {
            // Steals `item`, also on failure.
            let rc = unsafe { (sym.PyTuple_SetItem)(tuple.as_ptr(), index as isize, item.into_ptr()) };
            check(rc, self)?;
        }
        Ok(tuple)
    }

    /// Returns owned.
    pub fn new_dict(self) -> Result<PyRef<'py>> {
        gil_assert(&self);
        unsafe { PyRef::from_owned(self, (self.sym().PyDict_New)()) }
    }

    /// Returns owned. A read-only view over `dict`.
    pub fn dict_proxy(self, dict: &impl AsPyPtr) -> Result<PyRef<'py>> {
        self.require(dict, TypeCategory::Mapping)?;
        unsafe { PyRef::from_owned(self, (self.sym().PyDictProxy_New)(dict.as_ptr())) }
    }

    fn require(self, obj: &impl AsPyPtr, want: TypeCategory) -> Result<()> {
        let found = self.classify(obj.as_ptr());
        if found == want {
            Ok(())
        } else {
            Err(EmbedError::TypeMismatch {
                expected: want.name(),
                found,
            })
        }
    }

    /// Item count of a list, tuple, dict, bytes or str.
    pub fn len(self, obj: &impl AsPyPtr) -> Result<usize> {
        let sym = self.sym();
        let ptr = obj.as_ptr();
        let n = match self.classify(ptr) {
            TypeCategory::List => unsafe { (sym.PyList_Size)(ptr) },
            TypeCategory::Tuple => unsafe { (sym.PyTuple_Size)(ptr) },
            TypeCategory::Mapping => unsafe { (sym.PyDict_Size)(ptr) },
            TypeCategory::Bytes => unsafe { (sym.PyBytes_Size)(ptr) },
            TypeCategory::Text => {
                let mut size = 0isize;
                let data = unsafe { (sym.PyUnicode_AsUTF8AndSize)(ptr, &mut size) };
                if data.is_null() {
                    return Err(self.take_error());
                }
                size
            }
            found => {
                return Err(EmbedError::TypeMismatch {
                    expected: "sized container",
                    found,
                });
            }
        };
        usize::try_from(n).map_err(|_| self.take_error())
    }

    /// Returns borrowed. `seq` is a list or tuple.
    pub fn get_item<'a, T: AsPyPtr>(self, seq: &'a T, index: usize) -> Result<Borrowed<'a, 'py>> {
        let sym = self.sym();
        let ptr = seq.as_ptr();
        let index = ssize(index)?;
        let item = match self.classify(ptr) {
            TypeCategory::List => unsafe { (sym.PyList_GetItem)(ptr, index) },
            TypeCategory::Tuple => unsafe { (sym.PyTuple_GetItem)(ptr, index) },
            found => {
                return Err(EmbedError::TypeMismatch {
                    expected: "list or tuple",
                    found,
                });
            }
        };
        unsafe { Borrowed::from_ptr(self, item) }.ok_or_else(|| self.take_error())
    }

    /// Replaces slot `index` of a list or tuple. The value is stolen.
    pub fn set_item(self, seq: &impl AsPyPtr, index: usize, value: PyRef<'py>) -> Result<()> {
        let sym = self.sym();
        let ptr = seq.as_ptr();
        let index = ssize(index)?;
        let rc = match self.classify(ptr) {
            TypeCategory::List => unsafe { (sym.PyList_SetItem)(ptr, index, value.into_ptr()) },
            TypeCategory::Tuple => unsafe { (sym.PyTuple_SetItem)(ptr, index, value.into_ptr()) },
            found => {
                return Err(EmbedError::TypeMismatch {
                    expected: "list or tuple",
                    found,
                });
            }
        };
        check(rc, self)
    }

    /// Appends to a list. The list takes its own reference.
    pub fn append(self, list: &impl AsPyPtr, value: &impl AsPyPtr) -> Result<()> {
        self.require(list, TypeCategory::List)?;
        let rc = unsafe { (self.sym().PyList_Append)(list.as_ptr(), value.as_ptr()) };
        check(rc, self)
    }

    pub fn insert(self, list: &impl AsPyPtr, index: usize, value: &impl AsPyPtr) -> Result<()> {
        self.require(list, TypeCategory::List)?;
        let index = ssize(index)?;
        let rc = unsafe { (self.sym().PyList_Insert)(list.as_ptr(), index, value.as_ptr()) };
        check(rc, self)
    }

    /// Returns borrowed, or `None` when the key is absent.
    pub fn dict_get<'a, T: AsPyPtr>(
        self,
        dict: &'a T,
        key: &str,
    ) -> Result<Option<Borrowed<'a, 'py>>> {
        self.require(dict, TypeCategory::Mapping)?;
        let key = CString::new(key)?;
        let item = unsafe { (self.sym().PyDict_GetItemString)(dict.as_ptr(), key.as_ptr()) };
        Ok(unsafe { Borrowed::from_ptr(self, item) })
    }

    /// Returns borrowed, or `None` when the key is absent.
    pub fn dict_get_item<'a, T: AsPyPtr>(
        self,
        dict: &'a T,
        key: &impl AsPyPtr,
    ) -> Result<Option<Borrowed<'a, 'py>>> {
        self.require(dict, TypeCategory::Mapping)?;
        let item = unsafe { (self.sym().PyDict_GetItem)(dict.as_ptr(), key.as_ptr()) };
        Ok(unsafe { Borrowed::from_ptr(self, item) })
    }

    /// The dict takes its own references; nothing is stolen.
    pub fn dict_set(self, dict: &impl AsPyPtr, key: &str, value: &impl AsPyPtr) -> Result<()> {
        self.require(dict, TypeCategory::Mapping)?;
        let key = CString::new(key)?;
        let rc = unsafe {
            (self.sym().PyDict_SetItemString)(dict.as_ptr(), key.as_ptr(), value.as_ptr())
        };
        check(rc, self)
    }

    pub fn dict_set_item(
        self,
        dict: &impl AsPyPtr,
        key: &impl AsPyPtr,
        value: &impl AsPyPtr,
    ) -> Result<()> {
        self.require(dict, TypeCategory::Mapping)?;
        let rc =
            unsafe { (self.sym().PyDict_SetItem)(dict.as_ptr(), key.as_ptr(), value.as_ptr()) };
        check(rc, self)
    }

    pub fn dict_clear(self, dict: &impl AsPyPtr) -> Result<()> {
        self.require(dict, TypeCategory::Mapping)?;
        unsafe { (self.sym().PyDict_Clear)(dict.as_ptr()) };
        Ok(())
    }

    pub fn extract_i64(self, obj: &impl AsPyPtr) -> Result<i64> {
        let value = unsafe { (self.sym().PyLong_AsLongLong)(obj.as_ptr()) };
        if value == -1 && self.error_pending() {
            return Err(self.take_error());
        }
        Ok(value)
    }

    pub fn extract_f64(self, obj: &impl AsPyPtr) -> Result<f64> {
        let value = unsafe { (self.sym().PyFloat_AsDouble)(obj.as_ptr()) };
        if value == -1.0 && self.error_pending() {
            return Err(self.take_error());
        }
        Ok(value)
    }

    /// `str(obj)`, with invalid UTF-8 replaced.
    pub fn to_string_lossy(self, obj: &impl AsPyPtr) -> Result<String> {
        let sym = self.sym();
        if self.classify(obj.as_ptr()) == TypeCategory::Text {
            return self.utf8(obj.as_ptr());
        }
        let text = unsafe { PyRef::from_owned(self, (sym.PyObject_Str)(obj.as_ptr()))? };
        self.utf8(text.as_ptr())
    }

    fn utf8(self, text: *mut PyObject) -> Result<String> {
        let mut size = 0isize;
        let data: *const c_char = unsafe { (self.sym().PyUnicode_AsUTF8AndSize)(text, &mut size) };
        if data.is_null() {
            return Err(self.take_error());
        }
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size as usize) };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Contents of a `bytes` object, valid while `obj` is.
    pub fn as_bytes<'a, T: AsPyPtr>(self, obj: &'a T) -> Result<&'a [u8]> {
        self.require(obj, TypeCategory::Bytes)?;
        let sym = self.sym();
        let data = unsafe { (sym.PyBytes_AsString)(obj.as_ptr()) };
        if data.is_null() {
            return Err(self.take_error());
        }
        let len = unsafe { (sym.PyBytes_Size)(obj.as_ptr()) };
        if len <= 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len as usize) })
    }

    pub(crate) fn error_pending(self) -> bool {
        !unsafe { (self.sym().PyErr_Occurred)() }.is_null()
    }
}

impl<'py> PyRef<'py> {
    /// `list.append`, see [`PyToken::append`].
    pub fn append(&self, value: &impl AsPyPtr) -> Result<()> {
        self.py().append(self, value)
    }

    pub fn len(&self) -> Result<usize> {
        self.py().len(self)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get_item(&self, index: usize) -> Result<Borrowed<'_, 'py>> {
        self.py().get_item(self, index)
    }

    pub fn get(&self, key: &str) -> Result<Option<Borrowed<'_, 'py>>> {
        self.py().dict_get(self, key)
    }

    pub fn set(&self, key: &str, value: &impl AsPyPtr) -> Result<()> {
        self.py().dict_set(self, key, value)
    }

    pub fn extract_i64(&self) -> Result<i64> {
        self.py().extract_i64(self)
    }

    pub fn extract_f64(&self) -> Result<f64> {
        self.py().extract_f64(self)
    }

    pub fn to_string_lossy(&self) -> Result<String> {
        self.py().to_string_lossy(self)
    }
}
