use libc::{c_char, c_int};

macro_rules! opaque {
    ($($name:ident),* $(,)?) => {
        $(
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque!(PyObject, PyTypeObject, PyThreadState, PyInterpreterState);

pub type PyCFunction =
    Option<unsafe extern "C" fn(slf: *mut PyObject, args: *mut PyObject) -> *mut PyObject>;

pub const METH_VARARGS: c_int = 0x0001;
pub const METH_NOARGS: c_int = 0x0004;
pub const METH_O: c_int = 0x0008;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct PyMethodDef {
    pub ml_name: *const c_char,
    pub ml_meth: PyCFunction,
    pub ml_flags: c_int,
    pub ml_doc: *const c_char,
}

/// Grammar start symbol for `PyRun_String`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartToken {
    Single = 256,
    File = 257,
    Eval = 258,
    FuncType = 345,
}
