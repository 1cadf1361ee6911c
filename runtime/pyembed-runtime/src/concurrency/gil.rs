use std::marker::PhantomData;

use pyembed_abi::{PYGILSTATE_LOCKED, PyGILStateState};

use crate::error::Result;
use crate::loader::Symbols;
use crate::state::tls::{gil_depth, gil_depth_enter, gil_depth_exit};
use crate::state::{Runtime, RuntimePhase};

/// Proof that the calling thread holds the lock of the interpreter it is
/// running in. Every object operation takes one.
#[derive(Copy, Clone)]
pub struct PyToken<'py> {
    runtime: &'py Runtime,
    _unsend: PhantomData<*mut ()>,
}

impl<'py> PyToken<'py> {
    pub(crate) fn new(runtime: &'py Runtime) -> Self {
        Self {
            runtime,
            _unsend: PhantomData,
        }
    }

    /// Token for code the runtime calls into, such as host callables.
    ///
    /// # Safety
    /// The calling thread must hold the GIL for as long as the token lives.
    pub unsafe fn assume(runtime: &'py Runtime) -> Self {
        Self::new(runtime)
    }

    pub fn runtime(&self) -> &'py Runtime {
        self.runtime
    }

    pub(crate) fn sym(&self) -> &'py Symbols {
        self.runtime.symbols()
    }
}

/// Recursive acquisition through `PyGILState_Ensure`. Releases with the
/// exact state it got back, on every exit path.
///
/// Guards only live inside [`Runtime::with_gil`], so nested guards always
/// drop innermost first.
pub(crate) struct GilGuard<'rt> {
    runtime: &'rt Runtime,
    state: PyGILStateState,
    depth: usize,
    _unsend: PhantomData<*mut ()>,
}

impl<'rt> GilGuard<'rt> {
    pub(crate) fn acquire(runtime: &'rt Runtime) -> Result<Self> {
        runtime.locks().expect(RuntimePhase::Initialized)?;
        let state = unsafe { (runtime.symbols().PyGILState_Ensure)() };
        let depth = gil_depth_enter();
        log::trace!("GILState ensure (depth {depth})");
        Ok(Self {
            runtime,
            state,
            depth,
            _unsend: PhantomData,
        })
    }

    pub(crate) fn token(&self) -> PyToken<'_> {
        PyToken::new(self.runtime)
    }

    /// True when the lock was already held before this guard.
    pub(crate) fn was_held(&self) -> bool {
        self.state == PYGILSTATE_LOCKED
    }
}

impl Drop for GilGuard<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(gil_depth(), self.depth, "GILState released out of order");
        let depth = gil_depth_exit();
        log::trace!("GILState release (depth {depth})");
        unsafe { (self.runtime.symbols().PyGILState_Release)(self.state) };
    }
}

impl Runtime {
    /// Runs `f` holding the main interpreter's lock, taking it with
    /// `PyGILState_Ensure` if this thread does not already hold it.
    ///
    /// Calls nest freely; each one releases exactly what it acquired when
    /// `f` returns or unwinds.
    pub fn with_gil<F, R>(&self, f: F) -> Result<R>
    where
        F: for<'py> FnOnce(PyToken<'py>) -> R,
    {
        let guard = GilGuard::acquire(self)?;
        if guard.was_held() {
            log::trace!("GILState ensure found the lock held");
        }
        Ok(f(guard.token()))
    }

    /// Whether the calling thread holds the GIL, per `PyGILState_Check`.
    pub fn gil_held(&self) -> bool {
        if self.phase() != RuntimePhase::Initialized {
            return false;
        }
        unsafe { (self.symbols().PyGILState_Check)() == 1 }
    }
}

#[cfg(feature = "debug_gil")]
pub(crate) fn gil_assert(py: &PyToken<'_>) {
    assert!(py.runtime.gil_held(), "GIL required for object access");
}

#[cfg(not(feature = "debug_gil"))]
pub(crate) fn gil_assert(py: &PyToken<'_>) {
    debug_assert!(py.runtime.gil_held(), "GIL required for object access");
}
