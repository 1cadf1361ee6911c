//! `tp_flags` bits reported by `PyType_GetFlags` on 3.12.

pub const STATIC_BUILTIN: u64 = 1 << 1;
pub const DISALLOW_INSTANTIATION: u64 = 1 << 7;
pub const IMMUTABLETYPE: u64 = 1 << 8;
pub const HEAPTYPE: u64 = 1 << 9;
pub const BASETYPE: u64 = 1 << 10;
pub const HAVE_VECTORCALL: u64 = 1 << 11;
pub const READY: u64 = 1 << 12;
pub const HAVE_GC: u64 = 1 << 14;
pub const VALID_VERSION_TAG: u64 = 1 << 19;
pub const MATCH_SELF: u64 = 1 << 22;
pub const ITEMS_AT_END: u64 = 1 << 23;

pub const LONG_SUBCLASS: u64 = 1 << 24;
pub const LIST_SUBCLASS: u64 = 1 << 25;
pub const TUPLE_SUBCLASS: u64 = 1 << 26;
pub const BYTES_SUBCLASS: u64 = 1 << 27;
pub const UNICODE_SUBCLASS: u64 = 1 << 28;
pub const DICT_SUBCLASS: u64 = 1 << 29;

/// Union of the fast-subclass bits.
pub const CONTAINER_MASK: u64 = 0x3f << 24;

/// Bits every ready static builtin type carries.
pub const NONE_MASK: u64 = STATIC_BUILTIN | IMMUTABLETYPE | READY | VALID_VERSION_TAG;
pub const FLOAT_MASK: u64 = NONE_MASK | MATCH_SELF | BASETYPE;
pub const SET_MASK: u64 = FLOAT_MASK | HAVE_GC;
pub const MODULE_MASK: u64 = NONE_MASK | HAVE_GC | BASETYPE;
/// Static types without `tp_new` get `DISALLOW_INSTANTIATION` when readied.
/// Generators and the iterators behind `iter()` are among them.
pub const ITERATOR_MASK: u64 = NONE_MASK | HAVE_GC | DISALLOW_INSTANTIATION;
pub const CALLABLE_MASK: u64 = NONE_MASK | HAVE_GC | HAVE_VECTORCALL;

// The shape masks are superset checks, so several 3.12 builtins collide:
//   NONE_MASK      object, and any static type without further bits
//   FLOAT_MASK     bytearray, complex
//   MODULE_MASK    map, zip, enumerate, filter, reversed, property
//   ITERATOR_MASK  method-wrapper and other non-instantiable helpers
// A flag word alone cannot separate these; the runtime classifier confirms
// those shapes against the object before reporting them.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_mask_covers_subclass_bits() {
        for bit in [
            LONG_SUBCLASS,
            LIST_SUBCLASS,
            TUPLE_SUBCLASS,
            BYTES_SUBCLASS,
            UNICODE_SUBCLASS,
            DICT_SUBCLASS,
        ] {
            assert_eq!(bit & CONTAINER_MASK, bit);
        }
        assert_eq!(CONTAINER_MASK.count_ones(), 6);
    }

    #[test]
    fn builtin_masks_do_not_touch_container_bits() {
        for mask in [NONE_MASK, FLOAT_MASK, SET_MASK, MODULE_MASK, ITERATOR_MASK, CALLABLE_MASK] {
            assert_eq!(mask & CONTAINER_MASK, 0);
        }
    }
}
