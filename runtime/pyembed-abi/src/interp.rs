use libc::c_int;

/// Lock mode of a sub-interpreter (`PyInterpreterConfig.gil`).
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum GilMode {
    #[default]
    Default = 0,
    Shared = 1,
    Owned = 2,
}

impl GilMode {
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            0 => Some(Self::Default),
            1 => Some(Self::Shared),
            2 => Some(Self::Owned),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PyInterpreterConfig {
    pub use_main_obmalloc: c_int,
    pub allow_fork: c_int,
    pub allow_exec: c_int,
    pub allow_threads: c_int,
    pub allow_daemon_threads: c_int,
    pub check_multi_interp_extensions: c_int,
    pub gil: c_int,
}
