use std::ffi::CString;
use std::ptr::{NonNull, addr_of_mut};
use std::sync::OnceLock;

use pyembed_abi::{PyConfig, WChar};

use crate::call::Status;
use crate::concurrency::ThreadState;
use crate::error::{EmbedError, Result};
use crate::state::config::{ConfigGuard, InitConfig, PreInitConfig};
use crate::state::registry::{RuntimePhase, ThreadRole};
use crate::state::runtime::Runtime;
use crate::text::{WideString, path_cstring};

impl Runtime {
    /// `LibraryLoaded -> PreInitialized`.
    pub fn pre_initialize(&self, config: &PreInitConfig) -> Result<()> {
        self.locks().expect(RuntimePhase::LibraryLoaded)?;
        trace_lifecycle("pre-initialize");
        let raw = config.lower(self.symbols());
        let status = unsafe { self.status_calls().pre_initialize(&raw) };
        self.settle(
            "Py_PreInitialize",
            status,
            RuntimePhase::LibraryLoaded,
            RuntimePhase::PreInitialized,
        )
    }

    /// `PreInitialized -> Initialized`. Returns the main thread state, current
    /// on the calling thread and holding the GIL.
    pub fn initialize(&self, config: &InitConfig) -> Result<ThreadState> {
        self.locks().expect(RuntimePhase::PreInitialized)?;
        trace_lifecycle("initialize");
        let status = {
            let mut guard = ConfigGuard::new(self.symbols(), config.isolated);
            if let Err(err) = self.populate(&mut guard, config) {
                self.locks().abort();
                log::error!("init config rejected: {err}");
                return Err(err);
            }
            unsafe { self.status_calls().initialize_from_config(guard.as_mut_ptr()) }
        };
        self.settle(
            "Py_InitializeFromConfig",
            status,
            RuntimePhase::PreInitialized,
            RuntimePhase::Initialized,
        )?;

        let raw = unsafe { (self.symbols().PyThreadState_Get)() };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| EmbedError::invalid_state("no thread state after initialization"))?;
        let main = ThreadState::adopt(self.clone(), ptr, ThreadRole::Main)?;
        log::info!(
            "runtime initialized (main interpreter {})",
            main.interpreter().id()
        );
        Ok(main)
    }

    fn settle(
        &self,
        step: &str,
        status: Status,
        from: RuntimePhase,
        to: RuntimePhase,
    ) -> Result<()> {
        match status.into_result() {
            Ok(()) => {
                trace_lifecycle(step);
                self.locks().advance(from, to)
            }
            Err(err) => {
                self.locks().abort();
                log::error!("{step} failed: {err}");
                Err(err)
            }
        }
    }

    /// Fills `guard` field by field; the first failing call stops the rest.
    fn populate(&self, guard: &mut ConfigGuard<'_>, config: &InitConfig) -> Result<()> {
        config.apply_scalars(guard.raw_mut());
        let cfg = guard.as_mut_ptr();

        if let Some(home) = &config.home {
            let value = path_cstring(home)?;
            self.set_wide(cfg, unsafe { addr_of_mut!((*cfg).home) }, "home", &value)?;
        }
        if !config.python_path.is_empty() {
            let joined = std::env::join_paths(&config.python_path)
                .map_err(|err| EmbedError::InvalidConfig(format!("python path: {err}")))?;
            let value = path_cstring(joined.as_ref())?;
            self.set_wide(
                cfg,
                unsafe { addr_of_mut!((*cfg).pythonpath_env) },
                "pythonpath_env",
                &value,
            )?;
        }
        if let Some(name) = &config.program_name {
            let value = CString::new(name.as_str())?;
            self.set_wide(
                cfg,
                unsafe { addr_of_mut!((*cfg).program_name) },
                "program_name",
                &value,
            )?;
        }
        if let Some(dir) = &config.platlibdir {
            let value = CString::new(dir.as_str())?;
            self.set_wide(
                cfg,
                unsafe { addr_of_mut!((*cfg).platlibdir) },
                "platlibdir",
                &value,
            )?;
        }
        if !config.module_search_paths.is_empty() {
            unsafe { (*cfg).module_search_paths_set = 1 };
            for path in &config.module_search_paths {
                let wide = WideString::decode(self.symbols(), &path_cstring(path)?)?;
                let status = unsafe {
                    self.status_calls().wide_string_list_append(
                        addr_of_mut!((*cfg).module_search_paths),
                        wide.as_ptr(),
                    )
                };
                status.into_result()?;
            }
        }
        if config.read_before_init {
            unsafe { self.status_calls().config_read(cfg) }.into_result()?;
        }
        Ok(())
    }

    fn set_wide(
        &self,
        cfg: *mut PyConfig,
        field: *mut *mut WChar,
        name: &str,
        value: &CString,
    ) -> Result<()> {
        log::debug!("config.{name} = {:?}", value.to_string_lossy());
        unsafe {
            self.status_calls()
                .config_set_bytes_string(cfg, field, value.as_ptr())
        }
        .into_result()
    }

    /// `Initialized -> Finalized`, driven by the main thread state once
    /// `check_finalize_ready` passed. Cannot fail past that point.
    pub(crate) fn finalize_now(&self) {
        trace_lifecycle("finalize");
        let rc = unsafe { (self.symbols().Py_FinalizeEx)() };
        self.locks().teardown();
        trace_lifecycle("finalized");
        if rc < 0 {
            // Buffered stream data was lost; the runtime is gone either way.
            log::warn!("Py_FinalizeEx returned {rc}");
        }
        log::info!("runtime finalized");
    }
}

fn trace_lifecycle_enabled() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| {
        matches!(
            std::env::var("PYEMBED_TRACE_LIFECYCLE").ok().as_deref(),
            Some("1")
        )
    })
}

pub(crate) fn trace_lifecycle(step: &str) {
    log::trace!("lifecycle: {step}");
    if trace_lifecycle_enabled() {
        eprintln!("pyembed lifecycle: {step}");
    }
}
