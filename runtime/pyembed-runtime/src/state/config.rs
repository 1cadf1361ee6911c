//! Host-side configuration, lowered into the ABI structs right before each
//! lifecycle call.

use std::path::PathBuf;

use pyembed_abi::{
    GilMode, MemAllocator, OptimizeLevel, PyConfig, PyInterpreterConfig, PyPreConfig,
};

use crate::error::{EmbedError, Result};
use crate::loader::Symbols;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreInitConfig {
    /// Start from `PyPreConfig_InitIsolatedConfig` instead of the Python defaults.
    pub isolated: bool,
    pub allocator: MemAllocator,
    pub utf8_mode: Option<bool>,
    pub configure_locale: Option<bool>,
    pub dev_mode: Option<bool>,
}

impl PreInitConfig {
    pub fn python() -> Self {
        Self {
            isolated: false,
            allocator: MemAllocator::NotSet,
            utf8_mode: None,
            configure_locale: None,
            dev_mode: None,
        }
    }

    pub fn isolated() -> Self {
        Self {
            isolated: true,
            ..Self::python()
        }
    }

    pub fn with_allocator(mut self, allocator: MemAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_utf8_mode(mut self, on: bool) -> Self {
        self.utf8_mode = Some(on);
        self
    }

    pub fn with_configure_locale(mut self, on: bool) -> Self {
        self.configure_locale = Some(on);
        self
    }

    pub(crate) fn lower(&self, sym: &Symbols) -> PyPreConfig {
        let mut raw = PyPreConfig::default();
        unsafe {
            if self.isolated {
                (sym.PyPreConfig_InitIsolatedConfig)(&mut raw);
            } else {
                (sym.PyPreConfig_InitPythonConfig)(&mut raw);
            }
        }
        raw.parse_argv = 0;
        raw.allocator = self.allocator as i32;
        if let Some(on) = self.utf8_mode {
            raw.utf8_mode = on as i32;
        }
        if let Some(on) = self.configure_locale {
            raw.configure_locale = on as i32;
        }
        if let Some(on) = self.dev_mode {
            raw.dev_mode = on as i32;
        }
        raw
    }
}

impl Default for PreInitConfig {
    fn default() -> Self {
        Self::python()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitConfig {
    pub isolated: bool,
    pub home: Option<PathBuf>,
    /// Joined with the platform separator into `PYTHONPATH`-style input.
    pub python_path: Vec<PathBuf>,
    /// When non-empty, replaces the computed `sys.path` entirely.
    pub module_search_paths: Vec<PathBuf>,
    pub program_name: Option<String>,
    pub platlibdir: Option<String>,
    pub site_import: bool,
    pub user_site_directory: bool,
    pub install_signal_handlers: bool,
    pub safe_path: bool,
    pub write_bytecode: bool,
    pub optimization_level: OptimizeLevel,
    /// Run `PyConfig_Read` before initializing so path errors surface early.
    pub read_before_init: bool,
}

impl InitConfig {
    pub fn new() -> Self {
        Self {
            isolated: false,
            home: None,
            python_path: Vec::new(),
            module_search_paths: Vec::new(),
            program_name: None,
            platlibdir: None,
            site_import: true,
            user_site_directory: false,
            install_signal_handlers: false,
            safe_path: true,
            write_bytecode: true,
            optimization_level: OptimizeLevel::Unset,
            read_before_init: false,
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_python_path<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.python_path.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_module_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_search_paths.push(path.into());
        self
    }

    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    /// Scalar fields; wide-string fields are set separately through status calls.
    pub(crate) fn apply_scalars(&self, raw: &mut PyConfig) {
        raw.parse_argv = 0;
        raw.site_import = self.site_import as i32;
        raw.user_site_directory = self.user_site_directory as i32;
        raw.install_signal_handlers = self.install_signal_handlers as i32;
        raw.safe_path = self.safe_path as i32;
        raw.write_bytecode = self.write_bytecode as i32;
        if self.optimization_level != OptimizeLevel::Unset {
            raw.optimization_level = self.optimization_level as i32;
        }
    }
}

impl Default for InitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns an initialized `PyConfig` and clears it on drop.
pub(crate) struct ConfigGuard<'rt> {
    raw: Box<PyConfig>,
    sym: &'rt Symbols,
}

impl<'rt> ConfigGuard<'rt> {
    pub(crate) fn new(sym: &'rt Symbols, isolated: bool) -> Self {
        let mut raw = Box::new(PyConfig::zeroed());
        unsafe {
            if isolated {
                (sym.PyConfig_InitIsolatedConfig)(&mut *raw);
            } else {
                (sym.PyConfig_InitPythonConfig)(&mut *raw);
            }
        }
        Self { raw, sym }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut PyConfig {
        &mut *self.raw
    }

    pub(crate) fn raw_mut(&mut self) -> &mut PyConfig {
        &mut self.raw
    }
}

impl Drop for ConfigGuard<'_> {
    fn drop(&mut self) {
        unsafe { (self.sym.PyConfig_Clear)(&mut *self.raw) };
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubInterpreterConfig {
    pub gil: GilMode,
    pub use_main_obmalloc: bool,
    pub allow_fork: bool,
    pub allow_exec: bool,
    pub allow_threads: bool,
    pub allow_daemon_threads: bool,
    pub check_multi_interp_extensions: bool,
}

impl SubInterpreterConfig {
    /// Legacy settings: shares the main GIL and object allocator.
    pub fn shared() -> Self {
        Self {
            gil: GilMode::Shared,
            use_main_obmalloc: true,
            allow_fork: true,
            allow_exec: true,
            allow_threads: true,
            allow_daemon_threads: true,
            check_multi_interp_extensions: false,
        }
    }

    /// Isolated settings with a GIL of its own.
    pub fn owned() -> Self {
        Self {
            gil: GilMode::Owned,
            use_main_obmalloc: false,
            allow_fork: false,
            allow_exec: false,
            allow_threads: true,
            allow_daemon_threads: false,
            check_multi_interp_extensions: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gil == GilMode::Owned && self.use_main_obmalloc {
            return Err(EmbedError::InvalidConfig(
                "an owned GIL needs its own object allocator (use_main_obmalloc = false)".into(),
            ));
        }
        if !self.use_main_obmalloc && !self.check_multi_interp_extensions {
            return Err(EmbedError::InvalidConfig(
                "a private object allocator needs check_multi_interp_extensions".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn lower(&self) -> PyInterpreterConfig {
        PyInterpreterConfig {
            use_main_obmalloc: self.use_main_obmalloc as i32,
            allow_fork: self.allow_fork as i32,
            allow_exec: self.allow_exec as i32,
            allow_threads: self.allow_threads as i32,
            allow_daemon_threads: self.allow_daemon_threads as i32,
            check_multi_interp_extensions: self.check_multi_interp_extensions as i32,
            gil: self.gil as i32,
        }
    }
}

impl Default for SubInterpreterConfig {
    fn default() -> Self {
        Self::shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        SubInterpreterConfig::shared().validate().unwrap();
        SubInterpreterConfig::owned().validate().unwrap();
    }

    #[test]
    fn owned_gil_rejects_shared_allocator() {
        let config = SubInterpreterConfig {
            use_main_obmalloc: true,
            ..SubInterpreterConfig::owned()
        };
        assert!(matches!(config.validate(), Err(EmbedError::InvalidConfig(_))));
    }

    #[test]
    fn private_allocator_requires_extension_checks() {
        let config = SubInterpreterConfig {
            check_multi_interp_extensions: false,
            ..SubInterpreterConfig::owned()
        };
        assert!(config.validate().is_err());

        let shared_private = SubInterpreterConfig {
            use_main_obmalloc: false,
            check_multi_interp_extensions: true,
            ..SubInterpreterConfig::shared()
        };
        shared_private.validate().unwrap();
    }

    #[test]
    fn owned_preset_lowers_to_documented_values() {
        let raw = SubInterpreterConfig::owned().lower();
        assert_eq!(raw.gil, 2);
        assert_eq!(raw.use_main_obmalloc, 0);
        assert_eq!(raw.check_multi_interp_extensions, 1);
        assert_eq!(raw.allow_threads, 1);
    }

    #[test]
    fn init_scalars_follow_builder() {
        let config = InitConfig::new().with_home("/opt/py").with_python_path(["/a", "/b"]);
        let mut raw = PyConfig::zeroed();
        config.apply_scalars(&mut raw);
        assert_eq!(raw.site_import, 1);
        assert_eq!(raw.safe_path, 1);
        assert_eq!(raw.install_signal_handlers, 0);
        assert_eq!(config.python_path.len(), 2);
    }
}
