//! Calls to entry points that return `PyStatus` by value.
//!
//! Two strategies exist. `DirectCall` casts the symbol to a typed
//! `extern "C" fn` and lets the compiler lower the aggregate return.
//! `DescriptorCall` describes the call to libffi once per entry point and
//! writes each result into caller storage. [`PlatformStrategy`] picks one
//! per target at build time.

use std::ffi::c_void;
use std::mem::{MaybeUninit, offset_of, size_of};

use libc::c_char;
use libffi::middle::{Cif, CodePtr, Type};
use libffi::raw;
use pyembed_abi::{PyConfig, PyInterpreterConfig, PyPreConfig, PyStatus, PyThreadState, PyWideStringList, WChar};

use super::status::Status;
use crate::error::{EmbedError, Result};
use crate::loader::Library;

#[cfg(any(
    feature = "descriptor-call",
    all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))
))]
pub type PlatformStrategy = DescriptorCall;

#[cfg(not(any(
    feature = "descriptor-call",
    all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))
)))]
pub type PlatformStrategy = DirectCall;

pub trait StatusStrategy: Send + Sync + Sized {
    const NAME: &'static str;

    /// # Safety
    /// `addr` must be a C function taking `arity` pointer-sized arguments and
    /// returning `PyStatus`.
    unsafe fn from_address(entry: &'static str, addr: *const c_void, arity: usize) -> Result<Self>;

    /// # Safety
    /// `args` must match the entry point's parameters in count and meaning.
    unsafe fn invoke(&self, args: &[*const c_void]) -> PyStatus;
}

type Status1 = unsafe extern "C" fn(*const c_void) -> PyStatus;
type Status2 = unsafe extern "C" fn(*const c_void, *const c_void) -> PyStatus;
type Status3 = unsafe extern "C" fn(*const c_void, *const c_void, *const c_void) -> PyStatus;

#[derive(Copy, Clone)]
enum DirectFn {
    One(Status1),
    Two(Status2),
    Three(Status3),
}

pub struct DirectCall {
    func: DirectFn,
}

impl StatusStrategy for DirectCall {
    const NAME: &'static str = "direct";

    unsafe fn from_address(entry: &'static str, addr: *const c_void, arity: usize) -> Result<Self> {
        let func = unsafe {
            match arity {
                1 => DirectFn::One(std::mem::transmute::<*const c_void, Status1>(addr)),
                2 => DirectFn::Two(std::mem::transmute::<*const c_void, Status2>(addr)),
                3 => DirectFn::Three(std::mem::transmute::<*const c_void, Status3>(addr)),
                _ => {
                    return Err(EmbedError::Descriptor {
                        entry,
                        reason: format!("no direct signature for arity {arity}"),
                    });
                }
            }
        };
        Ok(Self { func })
    }

    unsafe fn invoke(&self, args: &[*const c_void]) -> PyStatus {
        unsafe {
            match self.func {
                DirectFn::One(f) => f(args[0]),
                DirectFn::Two(f) => f(args[0], args[1]),
                DirectFn::Three(f) => f(args[0], args[1], args[2]),
            }
        }
    }
}

pub struct DescriptorCall {
    cif: Cif,
    code: CodePtr,
    arity: usize,
}

// The cif and its types are never written after `Cif::new`; ffi_call only reads them.
unsafe impl Send for DescriptorCall {}
unsafe impl Sync for DescriptorCall {}

impl DescriptorCall {
    /// `PyStatus` as a libffi struct type, checked against the Rust layout.
    pub fn status_type(entry: &'static str) -> Result<Type> {
        let ty = Type::structure([Type::i32(), Type::pointer(), Type::pointer(), Type::i32()]);
        let raw_type = ty.as_raw_ptr();
        let mut offsets = [0usize; 4];
        let status = unsafe {
            raw::ffi_get_struct_offsets(raw::ffi_abi_FFI_DEFAULT_ABI, raw_type, offsets.as_mut_ptr())
        };
        if status != raw::ffi_status_FFI_OK {
            return Err(EmbedError::Descriptor {
                entry,
                reason: format!("ffi_get_struct_offsets returned {status}"),
            });
        }
        let expected = [
            offset_of!(PyStatus, kind),
            offset_of!(PyStatus, func),
            offset_of!(PyStatus, err_msg),
            offset_of!(PyStatus, exitcode),
        ];
        let size = unsafe { (*raw_type).size };
        if offsets != expected || size != size_of::<PyStatus>() {
            return Err(EmbedError::Descriptor {
                entry,
                reason: format!(
                    "layout mismatch: offsets {offsets:?} size {size}, expected {expected:?} size {}",
                    size_of::<PyStatus>()
                ),
            });
        }
        Ok(ty)
    }
}

impl StatusStrategy for DescriptorCall {
    const NAME: &'static str = "descriptor";

    unsafe fn from_address(entry: &'static str, addr: *const c_void, arity: usize) -> Result<Self> {
        if addr.is_null() {
            return Err(EmbedError::Descriptor {
                entry,
                reason: "null entry address".to_string(),
            });
        }
        let ret = Self::status_type(entry)?;
        let cif = Cif::new(vec![Type::pointer(); arity], ret);
        log::trace!("built call descriptor for {entry} ({arity} args)");
        Ok(Self {
            cif,
            code: CodePtr(addr as *mut c_void),
            arity,
        })
    }

    unsafe fn invoke(&self, args: &[*const c_void]) -> PyStatus {
        debug_assert_eq!(args.len(), self.arity);
        let mut slots: Vec<*const c_void> = args.to_vec();
        let mut arg_ptrs: Vec<*mut c_void> = slots
            .iter_mut()
            .map(|slot| slot as *mut *const c_void as *mut c_void)
            .collect();
        let mut out = MaybeUninit::<PyStatus>::zeroed();
        unsafe {
            raw::ffi_call(
                self.cif.as_raw_ptr(),
                Some(*self.code.as_safe_fun()),
                out.as_mut_ptr() as *mut c_void,
                arg_ptrs.as_mut_ptr(),
            );
            out.assume_init()
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusEntry {
    PreInitialize,
    ConfigSetBytesString,
    ConfigRead,
    InitializeFromConfig,
    NewInterpreterFromConfig,
    WideStringListAppend,
}

impl StatusEntry {
    pub const ALL: [StatusEntry; 6] = [
        Self::PreInitialize,
        Self::ConfigSetBytesString,
        Self::ConfigRead,
        Self::InitializeFromConfig,
        Self::NewInterpreterFromConfig,
        Self::WideStringListAppend,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::PreInitialize => "Py_PreInitialize",
            Self::ConfigSetBytesString => "PyConfig_SetBytesString",
            Self::ConfigRead => "PyConfig_Read",
            Self::InitializeFromConfig => "Py_InitializeFromConfig",
            Self::NewInterpreterFromConfig => "Py_NewInterpreterFromConfig",
            Self::WideStringListAppend => "PyWideStringList_Append",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::PreInitialize | Self::ConfigRead | Self::InitializeFromConfig => 1,
            Self::NewInterpreterFromConfig | Self::WideStringListAppend => 2,
            Self::ConfigSetBytesString => 3,
        }
    }
}

/// The status-returning entry points, bound through strategy `S`.
pub struct StatusCalls<S: StatusStrategy = PlatformStrategy> {
    pre_initialize: S,
    config_set_bytes_string: S,
    config_read: S,
    initialize_from_config: S,
    new_interpreter_from_config: S,
    wide_string_list_append: S,
}

impl<S: StatusStrategy> StatusCalls<S> {
    pub fn bind(lib: &Library) -> Result<Self> {
        let bind = |entry: StatusEntry| -> Result<S> {
            let addr = lib.address(entry.symbol())?;
            unsafe { S::from_address(entry.symbol(), addr, entry.arity()) }
        };
        let calls = Self {
            pre_initialize: bind(StatusEntry::PreInitialize)?,
            config_set_bytes_string: bind(StatusEntry::ConfigSetBytesString)?,
            config_read: bind(StatusEntry::ConfigRead)?,
            initialize_from_config: bind(StatusEntry::InitializeFromConfig)?,
            new_interpreter_from_config: bind(StatusEntry::NewInterpreterFromConfig)?,
            wide_string_list_append: bind(StatusEntry::WideStringListAppend)?,
        };
        log::debug!("bound {} status entry points ({})", StatusEntry::ALL.len(), S::NAME);
        Ok(calls)
    }

    pub fn strategy_name(&self) -> &'static str {
        S::NAME
    }

    /// # Safety
    /// `config` must be null or point to an initialized `PyPreConfig`.
    pub unsafe fn pre_initialize(&self, config: *const PyPreConfig) -> Status {
        unsafe { call(&self.pre_initialize, &[config.cast()]) }
    }

    /// # Safety
    /// `field` must point at a wide-string field inside `*config`.
    pub unsafe fn config_set_bytes_string(
        &self,
        config: *mut PyConfig,
        field: *mut *mut WChar,
        value: *const c_char,
    ) -> Status {
        unsafe {
            call(
                &self.config_set_bytes_string,
                &[config.cast_const().cast(), field.cast_const().cast(), value.cast()],
            )
        }
    }

    /// # Safety
    /// `config` must have been initialized by one of the `PyConfig_Init*` calls.
    pub unsafe fn config_read(&self, config: *mut PyConfig) -> Status {
        unsafe { call(&self.config_read, &[config.cast_const().cast()]) }
    }

    /// # Safety
    /// As for [`Self::config_read`].
    pub unsafe fn initialize_from_config(&self, config: *const PyConfig) -> Status {
        unsafe { call(&self.initialize_from_config, &[config.cast()]) }
    }

    /// # Safety
    /// The calling thread must hold the GIL with a current thread state.
    pub unsafe fn new_interpreter_from_config(
        &self,
        tstate_out: *mut *mut PyThreadState,
        config: *const PyInterpreterConfig,
    ) -> Status {
        unsafe {
            call(
                &self.new_interpreter_from_config,
                &[tstate_out.cast_const().cast(), config.cast()],
            )
        }
    }

    /// # Safety
    /// `list` must belong to a live `PyConfig`; `item` must be a nul-terminated wide string.
    pub unsafe fn wide_string_list_append(
        &self,
        list: *mut PyWideStringList,
        item: *const WChar,
    ) -> Status {
        unsafe {
            call(
                &self.wide_string_list_append,
                &[list.cast_const().cast(), item.cast()],
            )
        }
    }
}

unsafe fn call<S: StatusStrategy>(strategy: &S, args: &[*const c_void]) -> Status {
    let raw = unsafe { strategy.invoke(args) };
    unsafe { Status::from_raw(&raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::status::StatusKind;
    use proptest::prelude::*;

    extern "C" fn fake_pre_initialize(config: *const c_void) -> PyStatus {
        if config.is_null() {
            return PyStatus {
                kind: pyembed_abi::STATUS_TYPE_ERROR,
                func: c"fake_pre_initialize".as_ptr(),
                err_msg: c"preinitialization config is NULL".as_ptr(),
                exitcode: 0,
            };
        }
        PyStatus::ok()
    }

    extern "C" fn fake_encode(kind: *const c_void, code: *const c_void) -> PyStatus {
        PyStatus {
            kind: kind as usize as i32,
            func: std::ptr::null(),
            err_msg: c"encoded".as_ptr(),
            exitcode: code as usize as i32,
        }
    }

    extern "C" fn fake_set_bytes(_config: *const c_void, field: *const c_void, value: *const c_void) -> PyStatus {
        if field.is_null() || value.is_null() {
            return PyStatus {
                kind: pyembed_abi::STATUS_TYPE_ERROR,
                func: c"fake_set_bytes".as_ptr(),
                err_msg: c"missing argument".as_ptr(),
                exitcode: 0,
            };
        }
        PyStatus::ok()
    }

    fn both<F>(addr: *const c_void, arity: usize, args: &[*const c_void], check: F)
    where
        F: Fn(&Status),
    {
        let direct = unsafe { DirectCall::from_address("test", addr, arity) }.unwrap();
        let descriptor = unsafe { DescriptorCall::from_address("test", addr, arity) }.unwrap();
        let a = unsafe { call(&direct, args) };
        let b = unsafe { call(&descriptor, args) };
        check(&a);
        assert_eq!(a, b);
    }

    #[test]
    fn status_descriptor_matches_repr_c() {
        assert!(DescriptorCall::status_type("test").is_ok());
    }

    #[test]
    fn null_config_errors_on_both_paths() {
        both(fake_pre_initialize as *const c_void, 1, &[std::ptr::null()], |status| {
            assert_eq!(status.kind, StatusKind::Error);
            assert_eq!(status.message.as_deref(), Some("preinitialization config is NULL"));
        });
        let cfg = PyPreConfig::default();
        both(
            fake_pre_initialize as *const c_void,
            1,
            &[(&cfg as *const PyPreConfig).cast()],
            |status| assert!(status.is_ok()),
        );
    }

    #[test]
    fn three_argument_calls_agree() {
        let value = c"/tmp";
        let mut field: *mut WChar = std::ptr::null_mut();
        let field_ptr = (&mut field as *mut *mut WChar).cast_const().cast();
        both(
            fake_set_bytes as *const c_void,
            3,
            &[std::ptr::null(), field_ptr, value.as_ptr().cast()],
            |status| assert!(status.is_ok()),
        );
        both(
            fake_set_bytes as *const c_void,
            3,
            &[std::ptr::null(), field_ptr, std::ptr::null()],
            |status| assert_eq!(status.func.as_deref(), Some("fake_set_bytes")),
        );
    }

    #[test]
    fn unsupported_direct_arity_is_rejected() {
        let err = unsafe { DirectCall::from_address("test", fake_encode as *const c_void, 5) };
        assert!(matches!(err, Err(EmbedError::Descriptor { .. })));
    }

    #[test]
    fn null_address_has_no_descriptor() {
        let err = unsafe { DescriptorCall::from_address("test", std::ptr::null(), 1) };
        assert!(matches!(err, Err(EmbedError::Descriptor { .. })));
    }

    #[test]
    fn entry_arities_match_c_signatures() {
        assert_eq!(StatusEntry::PreInitialize.arity(), 1);
        assert_eq!(StatusEntry::ConfigSetBytesString.arity(), 3);
        assert_eq!(StatusEntry::NewInterpreterFromConfig.arity(), 2);
        assert_eq!(StatusEntry::WideStringListAppend.symbol(), "PyWideStringList_Append");
    }

    proptest! {
        #[test]
        fn strategies_agree_on_every_field(kind in 0usize..3, code in 0i32..=i32::MAX) {
            let args = [kind as *const c_void, code as usize as *const c_void];
            both(fake_encode as *const c_void, 2, &args, |status| {
                assert_eq!(status.exit_code, code);
                assert_eq!(status.message.as_deref(), Some("encoded"));
            });
        }
    }
}
