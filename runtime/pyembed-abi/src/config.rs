//! `PyPreConfig` and `PyConfig` as laid out by CPython 3.12 on unix.

use libc::{c_int, c_ulong};

pub type WChar = libc::wchar_t;

/// `PyMemAllocatorName`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum MemAllocator {
    #[default]
    NotSet = 0,
    Default = 1,
    Debug = 2,
    Malloc = 3,
    MallocDebug = 4,
    PyMalloc = 5,
    PyMallocDebug = 6,
}

#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OptimizeLevel {
    #[default]
    Unset = -1,
    None = 0,
    Asserts = 1,
    Docstrings = 2,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PyPreConfig {
    pub config_init: c_int,
    pub parse_argv: c_int,
    pub isolated: c_int,
    pub use_environment: c_int,
    pub configure_locale: c_int,
    pub coerce_c_locale: c_int,
    pub coerce_c_locale_warn: c_int,
    pub utf8_mode: c_int,
    pub dev_mode: c_int,
    pub allocator: c_int,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct PyWideStringList {
    pub length: isize,
    pub items: *mut *mut WChar,
}

#[repr(C)]
#[derive(Debug)]
pub struct PyConfig {
    pub config_init: c_int,
    pub isolated: c_int,
    pub use_environment: c_int,
    pub dev_mode: c_int,
    pub install_signal_handlers: c_int,
    pub use_hash_seed: c_int,
    pub hash_seed: c_ulong,
    pub faulthandler: c_int,
    pub tracemalloc: c_int,
    pub perf_profiling: c_int,
    pub import_time: c_int,
    pub code_debug_ranges: c_int,
    pub show_ref_count: c_int,
    pub dump_refs: c_int,
    pub dump_refs_file: *mut WChar,
    pub malloc_stats: c_int,
    pub filesystem_encoding: *mut WChar,
    pub filesystem_errors: *mut WChar,
    pub pycache_prefix: *mut WChar,
    pub parse_argv: c_int,
    pub orig_argv: PyWideStringList,
    pub argv: PyWideStringList,
    pub xoptions: PyWideStringList,
    pub warnoptions: PyWideStringList,
    pub site_import: c_int,
    pub bytes_warning: c_int,
    pub warn_default_encoding: c_int,
    pub inspect: c_int,
    pub interactive: c_int,
    pub optimization_level: c_int,
    pub parser_debug: c_int,
    pub write_bytecode: c_int,
    pub verbose: c_int,
    pub quiet: c_int,
    pub user_site_directory: c_int,
    pub configure_c_stdio: c_int,
    pub buffered_stdio: c_int,
    pub stdio_encoding: *mut WChar,
    pub stdio_errors: *mut WChar,
    pub check_hash_pycs_mode: *mut WChar,
    pub use_frozen_modules: c_int,
    pub safe_path: c_int,
    pub int_max_str_digits: c_int,

    // Path configuration inputs.
    pub pathconfig_warnings: c_int,
    pub program_name: *mut WChar,
    pub pythonpath_env: *mut WChar,
    pub home: *mut WChar,
    pub platlibdir: *mut WChar,

    // Path configuration outputs.
    pub module_search_paths_set: c_int,
    pub module_search_paths: PyWideStringList,
    pub stdlib_dir: *mut WChar,
    pub executable: *mut WChar,
    pub base_executable: *mut WChar,
    pub prefix: *mut WChar,
    pub base_prefix: *mut WChar,
    pub exec_prefix: *mut WChar,
    pub base_exec_prefix: *mut WChar,

    // Py_Main() only.
    pub skip_source_first_line: c_int,
    pub run_command: *mut WChar,
    pub run_module: *mut WChar,
    pub run_filename: *mut WChar,
    pub sys_path_0: *mut WChar,

    pub install_importlib: c_int,
    pub init_main: c_int,
    pub is_python_build: c_int,

    // Debug and stats builds append fields past `_is_python_build`.
    _slack: [usize; 4],
}

impl PyConfig {
    /// All-zero config, to be filled by `PyConfig_InitPythonConfig` or
    /// `PyConfig_InitIsolatedConfig` before use.
    pub fn zeroed() -> Self {
        // SAFETY: every field is an integer, a raw pointer, or an array of them.
        unsafe { std::mem::zeroed() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn preconfig_is_ten_ints() {
        assert_eq!(size_of::<PyPreConfig>(), 10 * size_of::<c_int>());
        assert_eq!(offset_of!(PyPreConfig, allocator), 36);
    }

    #[test]
    #[cfg(all(unix, target_pointer_width = "64"))]
    fn config_offsets_match_312_headers() {
        assert_eq!(size_of::<PyWideStringList>(), 16);
        assert_eq!(offset_of!(PyConfig, hash_seed), 24);
        assert_eq!(offset_of!(PyConfig, dump_refs_file), 64);
        assert_eq!(offset_of!(PyConfig, parse_argv), 104);
        assert_eq!(offset_of!(PyConfig, orig_argv), 112);
        assert_eq!(offset_of!(PyConfig, site_import), 176);
        assert_eq!(offset_of!(PyConfig, stdio_encoding), 232);
        assert_eq!(offset_of!(PyConfig, int_max_str_digits), 264);
        assert_eq!(offset_of!(PyConfig, program_name), 272);
        assert_eq!(offset_of!(PyConfig, pythonpath_env), 280);
        assert_eq!(offset_of!(PyConfig, home), 288);
        assert_eq!(offset_of!(PyConfig, module_search_paths), 312);
        assert_eq!(offset_of!(PyConfig, base_exec_prefix), 376);
        assert_eq!(offset_of!(PyConfig, sys_path_0), 416);
        assert_eq!(offset_of!(PyConfig, is_python_build), 432);
    }

    #[test]
    fn zeroed_config_has_null_strings() {
        let config = PyConfig::zeroed();
        assert!(config.home.is_null());
        assert_eq!(config.module_search_paths.length, 0);
    }

    #[test]
    fn allocator_discriminants() {
        assert_eq!(MemAllocator::Malloc as i32, 3);
        assert_eq!(MemAllocator::PyMallocDebug as i32, 6);
        assert_eq!(OptimizeLevel::Unset as i32, -1);
    }
}
