use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pyembed_abi::{PyObject, PyTypeObject};

use crate::call::StatusCalls;
use crate::error::{EmbedError, Result};
use crate::loader::{Library, Symbols};
use crate::state::lifecycle::trace_lifecycle;
use crate::state::registry::{LockManager, RuntimePhase};

static LOADED: AtomicBool = AtomicBool::new(false);

pub(crate) struct RuntimeInner {
    pub(crate) sym: Symbols,
    pub(crate) status: StatusCalls,
    pub(crate) locks: LockManager,
    // Static objects, kept as addresses so the runtime stays `Send`.
    none: usize,
    module_type: usize,
    float_type: usize,
    version: String,
    lib: Library,
}

/// The loaded runtime. Cheap to clone; every handle keeps one.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// `Unloaded -> LibraryLoaded`. One runtime per process.
    pub fn load(path: &Path) -> Result<Self> {
        if LOADED.swap(true, Ordering::SeqCst) {
            return Err(EmbedError::AlreadyLoaded);
        }
        Self::open(path).inspect_err(|_| LOADED.store(false, Ordering::SeqCst))
    }

    fn open(path: &Path) -> Result<Self> {
        trace_lifecycle("load");
        let lib = Library::open(path)?;
        let sym = Symbols::resolve(&lib)?;
        let version = sym.check_version()?;
        let status = StatusCalls::bind(&lib)?;
        let none = lib.address("_Py_NoneStruct")? as usize;
        let module_type = lib.address("PyModule_Type")? as usize;
        let float_type = lib.address("PyFloat_Type")? as usize;
        log::info!(
            "loaded CPython {} from {} ({} status calls)",
            version.split_whitespace().next().unwrap_or(&version),
            path.display(),
            status.strategy_name()
        );
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                sym,
                status,
                locks: LockManager::new(),
                none,
                module_type,
                float_type,
                version,
                lib,
            }),
        })
    }

    pub fn symbols(&self) -> &Symbols {
        &self.inner.sym
    }

    pub fn status_calls(&self) -> &StatusCalls {
        &self.inner.status
    }

    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    pub(crate) fn none_ptr(&self) -> *mut PyObject {
        self.inner.none as *mut PyObject
    }

    pub(crate) fn module_type(&self) -> *mut PyTypeObject {
        self.inner.module_type as *mut PyTypeObject
    }

    pub(crate) fn float_type(&self) -> *mut PyTypeObject {
        self.inner.float_type as *mut PyTypeObject
    }

    pub fn phase(&self) -> RuntimePhase {
        self.inner.locks.phase()
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn library_path(&self) -> &Path {
        self.inner.lib.path()
    }

    /// Thread states the runtime still tracks, main included.
    pub fn live_thread_states(&self) -> usize {
        self.inner.locks.live_thread_states()
    }

    pub fn live_sub_interpreters(&self) -> usize {
        self.inner.locks.live_sub_interpreters()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("library", &self.library_path())
            .field("phase", &self.phase())
            .finish()
    }
}
