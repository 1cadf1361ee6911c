//! Running source text, importing modules and surfacing Python exceptions.

use std::ffi::{CString, c_char};

use pyembed_abi::{PyObject, PyTypeObject, StartToken};

use crate::concurrency::{PyToken, gil_assert};
use crate::error::{EmbedError, Result};
use crate::loader::Symbols;
use crate::object::{AsPyPtr, PyRef, TypeCategory};

impl<'py> PyToken<'py> {
    /// Fetches and clears the pending exception as an [`EmbedError::Python`].
    pub fn take_error(self) -> EmbedError {
        let sym = self.sym();
        let exc = unsafe { (sym.PyErr_GetRaisedException)() };
        if exc.is_null() {
            return EmbedError::Python {
                kind: "SystemError".into(),
                message: "null result without an exception set".into(),
            };
        }
        let kind = unsafe {
            let ty = (sym.PyObject_Type)(exc);
            let name = if ty.is_null() {
                None
            } else {
                let name = owned_text(sym, (sym.PyType_GetName)(ty.cast::<PyTypeObject>()));
                (sym.Py_DecRef)(ty);
                name
            };
            name.unwrap_or_else(|| "Exception".into())
        };
        let message = unsafe { owned_text(sym, (sym.PyObject_Str)(exc)) }.unwrap_or_default();
        unsafe { (sym.Py_DecRef)(exc) };
        // Formatting may itself have failed; never leave that pending.
        unsafe { (sym.PyErr_Clear)() };
        log::debug!("python raised {kind}: {message}");
        EmbedError::Python { kind, message }
    }

    /// Prints the pending exception to `sys.stderr` and clears it.
    pub fn print_error(self) {
        if self.error_pending() {
            unsafe { (self.sym().PyErr_Print)() };
        }
    }

    pub fn clear_error(self) {
        unsafe { (self.sym().PyErr_Clear)() };
    }

    /// `PyRun_SimpleString` in `__main__`. The traceback goes to stderr; only
    /// the failure is reported back.
    pub fn run_simple(self, code: &str) -> Result<()> {
        gil_assert(&self);
        let code = CString::new(code)?;
        let rc = unsafe { (self.sym().PyRun_SimpleString)(code.as_ptr()) };
        if rc != 0 {
            return Err(EmbedError::Python {
                kind: "Exception".into(),
                message: "PyRun_SimpleString failed (traceback printed)".into(),
            });
        }
        Ok(())
    }

    /// Returns owned. `globals` must be a dict; `locals` defaults to it.
    pub fn run(
        self,
        code: &str,
        start: StartToken,
        globals: &PyRef<'py>,
        locals: Option<&PyRef<'py>>,
    ) -> Result<PyRef<'py>> {
        gil_assert(&self);
        globals.expect_category(TypeCategory::Mapping)?;
        let locals = locals.unwrap_or(globals);
        let code = CString::new(code)?;
        unsafe {
            PyRef::from_owned(
                self,
                (self.sym().PyRun_String)(
                    code.as_ptr(),
                    start as i32,
                    globals.as_ptr(),
                    locals.as_ptr(),
                ),
            )
        }
    }

    /// Returns owned. Evaluates one expression against `globals`.
    pub fn eval(self, expr: &str, globals: &PyRef<'py>) -> Result<PyRef<'py>> {
        self.run(expr, StartToken::Eval, globals, None)
    }

    /// Returns owned. A fresh globals dict with `__builtins__` bound, for `run`.
    pub fn new_globals(self) -> Result<PyRef<'py>> {
        let globals = self.new_dict()?;
        let builtins = self.import("builtins")?;
        globals.set("__builtins__", &builtins)?;
        Ok(globals)
    }

    /// Returns owned.
    pub fn import(self, name: &str) -> Result<PyRef<'py>> {
        gil_assert(&self);
        let name = CString::new(name)?;
        unsafe { PyRef::from_owned(self, (self.sym().PyImport_ImportModule)(name.as_ptr())) }
    }

    /// Returns owned. An empty module object, not registered in `sys.modules`.
    pub fn new_module(self, name: &str) -> Result<PyRef<'py>> {
        gil_assert(&self);
        let name = CString::new(name)?;
        unsafe { PyRef::from_owned(self, (self.sym().PyModule_New)(name.as_ptr())) }
    }

    /// Binds `value` as attribute `name` of `module`. Nothing is stolen.
    pub fn module_add(self, module: &PyRef<'py>, name: &str, value: &impl AsPyPtr) -> Result<()> {
        gil_assert(&self);
        let name = CString::new(name)?;
        let rc = unsafe {
            (self.sym().PyModule_AddObjectRef)(module.as_ptr(), name.as_ptr(), value.as_ptr())
        };
        if rc < 0 {
            return Err(self.take_error());
        }
        Ok(())
    }
}

/// Consumes a new reference to a `str` and copies it out.
unsafe fn owned_text(sym: &Symbols, obj: *mut PyObject) -> Option<String> {
    if obj.is_null() {
        return None;
    }
    let mut size = 0isize;
    let data: *const c_char = unsafe { (sym.PyUnicode_AsUTF8AndSize)(obj, &mut size) };
    let text = (!data.is_null()).then(|| {
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size as usize) };
        String::from_utf8_lossy(bytes).into_owned()
    });
    unsafe { (sym.Py_DecRef)(obj) };
    text
}
