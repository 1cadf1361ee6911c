use std::ptr::{self, NonNull};

use pyembed_abi::{GilMode, PyThreadState};

use super::gil::PyToken;
use super::thread_state::{InterpreterRef, ThreadState};
use crate::error::{EmbedError, Refused, Result};
use crate::state::lifecycle::trace_lifecycle;
use crate::state::{InterpreterPhase, RuntimePhase, SubInterpreterConfig, ThreadPhase, ThreadRole};

/// A sub-interpreter created from a parent thread state.
///
/// While it lives, its root thread state is current on this OS thread and the
/// parent is parked. Ending it (explicitly or on drop) makes the parent
/// current again. Dropping it with workers still attached blocks until they
/// are released, so a worker owned by the dropping thread deadlocks.
pub struct SubInterpreter<'p> {
    parent: &'p mut ThreadState,
    root: Option<ThreadState>,
    interp: InterpreterRef,
    gil: GilMode,
}

impl ThreadState {
    /// Creates a sub-interpreter and switches this OS thread into it.
    pub fn new_sub_interpreter(
        &mut self,
        config: &SubInterpreterConfig,
    ) -> Result<SubInterpreter<'_>> {
        config.validate()?;
        self.runtime().locks().expect(RuntimePhase::Initialized)?;
        let raw = config.lower();
        let mut out: *mut PyThreadState = ptr::null_mut();
        let status = unsafe {
            self.runtime()
                .status_calls()
                .new_interpreter_from_config(&mut out, &raw)
        };
        // On failure the parent is current again.
        status.into_result()?;
        let root = NonNull::new(out).ok_or_else(|| {
            EmbedError::invalid_state("Py_NewInterpreterFromConfig returned no thread state")
        })?;
        self.mark(ThreadPhase::Saved);

        let runtime = self.runtime().clone();
        let root = ThreadState::adopt(runtime.clone(), root, ThreadRole::InterpreterRoot)?;
        let interp = root.interpreter().clone();
        let gil = match config.gil {
            GilMode::Owned => GilMode::Owned,
            GilMode::Default | GilMode::Shared => GilMode::Shared,
        };
        let locks = runtime.locks();
        locks.register_interpreter(interp.id(), gil);
        locks.set_interpreter_phase(interp.id(), InterpreterPhase::Running);
        trace_lifecycle("sub-interpreter created");
        log::debug!("created sub-interpreter {} ({gil:?} GIL)", interp.id());

        Ok(SubInterpreter {
            parent: self,
            root: Some(root),
            interp,
            gil,
        })
    }
}

impl SubInterpreter<'_> {
    pub fn id(&self) -> i64 {
        self.interp.id()
    }

    pub fn gil_mode(&self) -> GilMode {
        self.gil
    }

    /// Handle other threads can use to attach worker thread states.
    pub fn interpreter(&self) -> &InterpreterRef {
        &self.interp
    }

    pub fn thread_state(&self) -> Option<&ThreadState> {
        self.root.as_ref()
    }

    pub fn token(&self) -> Result<PyToken<'_>> {
        self.root
            .as_ref()
            .map(ThreadState::token)
            .ok_or_else(|| EmbedError::invalid_state("sub-interpreter has ended"))
    }

    /// Releases this interpreter's lock while `f` runs so workers attached to
    /// it can make progress.
    pub fn allow_threads<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let root = self
            .root
            .as_mut()
            .ok_or_else(|| EmbedError::invalid_state("sub-interpreter has ended"))?;
        Ok(root.allow_threads(f))
    }

    /// `Running -> Ended`. Refused while worker thread states remain; the
    /// refusal hands the interpreter back, still current on this thread.
    pub fn end(mut self) -> std::result::Result<(), Refused<Self>> {
        let id = self.interp.id();
        let workers = self.parent.runtime().locks().workers_of(id);
        if workers > 0 {
            let err = EmbedError::invalid_state(format!(
                "sub-interpreter {id} still has {workers} worker thread state(s)"
            ));
            return Err(Refused::new(self, err));
        }
        self.end_now();
        Ok(())
    }

    /// Ends the interpreter once its workers are gone, releasing its lock
    /// while it waits so they can finish.
    fn end_when_idle(&mut self) {
        let id = self.interp.id();
        let runtime = self.parent.runtime().clone();
        let Some(root) = self.root.as_mut() else {
            return;
        };
        // Workers can only attach while the interpreter runs, so recheck
        // under the lock after every wait.
        while runtime.locks().workers_of(id) > 0 {
            log::warn!("sub-interpreter {id} dropped with live workers; waiting for them");
            root.allow_threads(|| runtime.locks().wait_for_workers(id));
        }
        self.end_now();
    }

    /// Caller holds this interpreter's lock and has seen no workers.
    fn end_now(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        let id = self.interp.id();
        let runtime = self.parent.runtime();
        let sym = runtime.symbols();
        unsafe { (sym.Py_EndInterpreter)(root.as_ptr()) };
        root.forget_ended();
        runtime.locks().set_interpreter_phase(id, InterpreterPhase::Ended);
        trace_lifecycle("sub-interpreter ended");

        // No thread state is current now; the parent takes its lock back.
        unsafe { (sym.PyEval_RestoreThread)(self.parent.as_ptr()) };
        self.parent.mark(ThreadPhase::Attached);
        log::debug!("ended sub-interpreter {id}");
    }
}

/// Blocks until every worker attached to the interpreter is released, then
/// ends it. The parent never becomes usable while the root is current.
impl Drop for SubInterpreter<'_> {
    fn drop(&mut self) {
        self.end_when_idle();
    }
}

impl std::fmt::Debug for SubInterpreter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubInterpreter")
            .field("id", &self.interp.id())
            .field("gil", &self.gil)
            .field("ended", &self.root.is_none())
            .finish()
    }
}
