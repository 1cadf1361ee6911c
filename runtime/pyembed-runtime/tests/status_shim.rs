mod common;

use std::ptr;

use pyembed_abi::PyConfig;
use pyembed_runtime::call::{DescriptorCall, DirectCall, StatusCalls, StatusKind};
use pyembed_runtime::loader::{Library, Symbols};

#[test]
fn both_call_strategies_decode_real_statuses() {
    let Some(path) = common::library_or_skip("status_shim") else {
        return;
    };
    let lib = Library::open(&path).expect("open libpython");
    let sym = Symbols::resolve(&lib).expect("resolve symbols");
    let direct = StatusCalls::<DirectCall>::bind(&lib).expect("bind direct");
    let descriptor = StatusCalls::<DescriptorCall>::bind(&lib).expect("bind descriptor");

    let a = unsafe { direct.pre_initialize(ptr::null()) };
    let b = unsafe { descriptor.pre_initialize(ptr::null()) };
    assert_eq!(a.kind, StatusKind::Error);
    assert!(a.message.is_some(), "{a:?}");
    assert_eq!(a, b);

    let mut config = Box::new(PyConfig::zeroed());
    unsafe { (sym.PyConfig_InitPythonConfig)(&mut *config) };
    let cfg: *mut PyConfig = &mut *config;
    let home = unsafe { ptr::addr_of_mut!((*cfg).home) };
    let a = unsafe { direct.config_set_bytes_string(cfg, home, c"".as_ptr()) };
    let b = unsafe { descriptor.config_set_bytes_string(cfg, home, c"".as_ptr()) };
    assert_eq!(a, b);
    assert!(a.is_ok(), "{a:?}");
    unsafe { (sym.PyConfig_Clear)(cfg) };
}
