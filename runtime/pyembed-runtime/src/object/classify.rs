use std::fmt;

use pyembed_abi::flags::{
    BYTES_SUBCLASS, CALLABLE_MASK, CONTAINER_MASK, DICT_SUBCLASS, FLOAT_MASK, ITERATOR_MASK,
    LIST_SUBCLASS, LONG_SUBCLASS, MODULE_MASK, NONE_MASK, SET_MASK, TUPLE_SUBCLASS,
    UNICODE_SUBCLASS,
};
use pyembed_abi::{PyObject, PyTypeObject};

use crate::concurrency::{PyToken, gil_assert};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Integer,
    List,
    Tuple,
    Bytes,
    Text,
    Mapping,
    None,
    Float,
    Set,
    Callable,
    Iterator,
    Module,
    Unknown,
}

/// Subclass bits, checked in this order once any of them is set.
const CONTAINERS: [(u64, TypeCategory); 6] = [
    (LONG_SUBCLASS, TypeCategory::Integer),
    (LIST_SUBCLASS, TypeCategory::List),
    (TUPLE_SUBCLASS, TypeCategory::Tuple),
    (BYTES_SUBCLASS, TypeCategory::Bytes),
    (UNICODE_SUBCLASS, TypeCategory::Text),
    (DICT_SUBCLASS, TypeCategory::Mapping),
];

/// Full masks, most specific first; every bit must be present.
const SHAPES: [(u64, TypeCategory); 6] = [
    (CALLABLE_MASK, TypeCategory::Callable),
    (ITERATOR_MASK, TypeCategory::Iterator),
    (SET_MASK, TypeCategory::Set),
    (MODULE_MASK, TypeCategory::Module),
    (FLOAT_MASK, TypeCategory::Float),
    (NONE_MASK, TypeCategory::None),
];

impl TypeCategory {
    pub fn from_flags(flags: u64) -> Self {
        if flags & CONTAINER_MASK != 0 {
            return CONTAINERS
                .iter()
                .find(|(bit, _)| flags & bit != 0)
                .map_or(Self::Unknown, |&(_, cat)| cat);
        }
        SHAPES
            .iter()
            .find(|(mask, _)| flags & mask == *mask)
            .map_or(Self::Unknown, |&(_, cat)| cat)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Bytes => "bytes",
            Self::Text => "str",
            Self::Mapping => "dict",
            Self::None => "None",
            Self::Float => "float",
            Self::Set => "set",
            Self::Callable => "callable",
            Self::Iterator => "iterator",
            Self::Module => "module",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the runtime says about an object whose flag word lands on a shape
/// several builtins share.
#[derive(Copy, Clone, Debug, Default)]
struct Confirmed {
    none: bool,
    float: bool,
    module: bool,
    iterator: bool,
    callable: bool,
}

impl TypeCategory {
    /// Whether the flag word alone can mislabel this shape.
    fn is_shared_shape(self) -> bool {
        matches!(
            self,
            Self::None | Self::Float | Self::Module | Self::Iterator | Self::Callable
        )
    }

    fn settle(self, facts: Confirmed) -> Self {
        let ok = match self {
            Self::None => facts.none,
            Self::Float => facts.float,
            Self::Module => facts.module,
            Self::Iterator => facts.iterator,
            Self::Callable => facts.callable,
            _ => return self,
        };
        if ok {
            self
        } else if facts.iterator {
            Self::Iterator
        } else if facts.callable {
            Self::Callable
        } else {
            Self::Unknown
        }
    }
}

impl PyToken<'_> {
    /// Maps an object to its category from its type's flag word.
    /// Null objects and objects without a type are `Unknown`.
    ///
    /// Shapes that several builtins share are confirmed against the object,
    /// so `map(...)` is an iterator and `bytearray` is `Unknown`.
    pub fn classify(&self, obj: *mut PyObject) -> TypeCategory {
        if obj.is_null() {
            return TypeCategory::Unknown;
        }
        gil_assert(self);
        let sym = self.sym();
        let ty = unsafe { (sym.PyObject_Type)(obj) };
        if ty.is_null() {
            unsafe { (sym.PyErr_Clear)() };
            return TypeCategory::Unknown;
        }
        let ty = ty.cast::<PyTypeObject>();
        let flags = unsafe { (sym.PyType_GetFlags)(ty) };
        let shape = TypeCategory::from_flags(flags as u64);
        let category = if shape.is_shared_shape() {
            let rt = self.runtime();
            shape.settle(unsafe {
                Confirmed {
                    none: obj == rt.none_ptr(),
                    float: (sym.PyType_IsSubtype)(ty, rt.float_type()) != 0,
                    module: (sym.PyType_IsSubtype)(ty, rt.module_type()) != 0,
                    iterator: (sym.PyIter_Check)(obj) != 0,
                    callable: (sym.PyCallable_Check)(obj) != 0,
                }
            })
        } else {
            shape
        };
        unsafe { (sym.Py_DecRef)(ty.cast::<PyObject>()) };
        category
    }
}
