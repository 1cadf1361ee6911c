use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::thread::ThreadId;

use pyembed_abi::{PyInterpreterState, PyThreadState};

use super::gil::PyToken;
use crate::error::{EmbedError, Refused, Result};
use crate::state::{InterpreterPhase, Runtime, RuntimePhase, ThreadPhase, ThreadRole};

/// Identifies one interpreter, main or sub. Shareable across threads so
/// workers can attach to it.
#[derive(Clone)]
pub struct InterpreterRef {
    runtime: Runtime,
    ptr: NonNull<PyInterpreterState>,
    id: i64,
}

// Only the address and id cross threads; every use goes through a thread
// state created on the using thread.
unsafe impl Send for InterpreterRef {}
unsafe impl Sync for InterpreterRef {}

impl InterpreterRef {
    pub(crate) fn of_thread(runtime: &Runtime, tstate: NonNull<PyThreadState>) -> Result<Self> {
        let sym = runtime.symbols();
        let raw = unsafe { (sym.PyThreadState_GetInterpreter)(tstate.as_ptr()) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| EmbedError::invalid_state("thread state has no interpreter"))?;
        let id = unsafe { (sym.PyInterpreterState_GetID)(ptr.as_ptr()) };
        Ok(Self {
            runtime: runtime.clone(),
            ptr,
            id,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_main(&self) -> bool {
        self.id == 0
    }

    pub fn as_ptr(&self) -> *mut PyInterpreterState {
        self.ptr.as_ptr()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Creates a worker thread state for the calling OS thread and makes it
    /// current, blocking until this interpreter's lock is free.
    pub fn attach(&self) -> Result<ThreadState> {
        let locks = self.runtime.locks();
        locks.expect(RuntimePhase::Initialized)?;
        let running = locks.interpreter_phase(self.id) == Some(InterpreterPhase::Running);
        if !self.is_main() && !running {
            return Err(EmbedError::invalid_state(format!(
                "interpreter {} is not running",
                self.id
            )));
        }
        let sym = self.runtime.symbols();
        let raw = unsafe { (sym.PyThreadState_New)(self.ptr.as_ptr()) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| EmbedError::invalid_state("PyThreadState_New returned null"))?;
        unsafe { (sym.PyEval_RestoreThread)(ptr.as_ptr()) };
        let ts = ThreadState::adopt(self.runtime.clone(), ptr, ThreadRole::Worker)?;
        log::debug!("attached worker thread state to interpreter {}", self.id);
        Ok(ts)
    }
}

impl std::fmt::Debug for InterpreterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterRef").field("id", &self.id).finish()
    }
}

#[derive(Clone)]
struct Binding {
    runtime: Runtime,
    ptr: NonNull<PyThreadState>,
    interp: InterpreterRef,
    role: ThreadRole,
    slot: u64,
}

/// A thread state that is current on this OS thread and holds its
/// interpreter's lock. It cannot leave the thread; hand it off with
/// [`ThreadState::save`].
pub struct ThreadState {
    binding: Binding,
    owner: ThreadId,
    _unsend: PhantomData<*mut ()>,
}

impl ThreadState {
    pub(crate) fn adopt(
        runtime: Runtime,
        ptr: NonNull<PyThreadState>,
        role: ThreadRole,
    ) -> Result<Self> {
        let interp = InterpreterRef::of_thread(&runtime, ptr)?;
        let slot = runtime.locks().register_thread(role, interp.id());
        Ok(Self::bound(Binding {
            runtime,
            ptr,
            interp,
            role,
            slot,
        }))
    }

    fn bound(binding: Binding) -> Self {
        Self {
            binding,
            owner: std::thread::current().id(),
            _unsend: PhantomData,
        }
    }

    fn into_binding(self) -> Binding {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the binding moves out exactly once.
        unsafe { std::ptr::read(&this.binding) }
    }

    fn debug_check_owner(&self) {
        debug_assert_eq!(
            self.owner,
            std::thread::current().id(),
            "thread state used off its owning thread"
        );
    }

    pub fn token(&self) -> PyToken<'_> {
        self.debug_check_owner();
        PyToken::new(&self.binding.runtime)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.binding.runtime
    }

    pub fn interpreter(&self) -> &InterpreterRef {
        &self.binding.interp
    }

    pub fn role(&self) -> ThreadRole {
        self.binding.role
    }

    pub fn as_ptr(&self) -> *mut PyThreadState {
        self.binding.ptr.as_ptr()
    }

    pub(crate) fn slot(&self) -> u64 {
        self.binding.slot
    }

    /// Gives up currency and the lock (`PyEval_SaveThread`).
    pub fn save(self) -> SavedThread {
        self.debug_check_owner();
        let binding = self.into_binding();
        let saved = unsafe { (binding.runtime.symbols().PyEval_SaveThread)() };
        debug_assert_eq!(saved, binding.ptr.as_ptr());
        binding
            .runtime
            .locks()
            .set_thread_phase(binding.slot, ThreadPhase::Saved);
        SavedThread { binding }
    }

    /// Releases the lock while `f` runs and takes it back afterwards, also
    /// when `f` unwinds.
    pub fn allow_threads<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.debug_check_owner();
        let sym = self.binding.runtime.symbols();
        let saved = unsafe { (sym.PyEval_SaveThread)() };
        debug_assert_eq!(saved, self.as_ptr());
        self.binding
            .runtime
            .locks()
            .set_thread_phase(self.binding.slot, ThreadPhase::Saved);
        let _restore = RestoreOnDrop { ts: self };
        f()
    }

    pub(crate) fn mark(&self, phase: ThreadPhase) {
        self.binding
            .runtime
            .locks()
            .set_thread_phase(self.binding.slot, phase);
    }

    /// Clears and deletes a worker thread state, releasing the lock.
    pub fn release(self) -> Result<()> {
        if self.role() != ThreadRole::Worker {
            return Err(EmbedError::invalid_state(format!(
                "{:?} thread states are not released directly",
                self.role()
            )));
        }
        self.debug_check_owner();
        release_worker(&self.into_binding());
        Ok(())
    }

    /// `Initialized -> Finalized`. Only the main thread state may do this,
    /// with every sub-interpreter ended and every worker released. A refused
    /// call hands the main thread state back, still current.
    pub fn finalize(self) -> std::result::Result<(), Refused<Self>> {
        if self.role() != ThreadRole::Main {
            let err = EmbedError::invalid_state("finalize must run on the main thread state");
            return Err(Refused::new(self, err));
        }
        self.debug_check_owner();
        let runtime = self.runtime().clone();
        if let Err(err) = runtime.locks().check_finalize_ready(self.slot()) {
            return Err(Refused::new(self, err));
        }
        runtime.finalize_now();
        // Finalization freed the thread state.
        drop(self.into_binding());
        Ok(())
    }

    /// Called by the sub-interpreter owning this root state once
    /// `Py_EndInterpreter` has freed it.
    pub(crate) fn forget_ended(self) {
        let binding = self.into_binding();
        binding.runtime.locks().forget_thread(binding.slot);
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        match self.binding.role {
            ThreadRole::Worker => release_worker(&self.binding),
            role => log::warn!(
                "{role:?} thread state dropped while current; the runtime stays initialized"
            ),
        }
    }
}

fn release_worker(binding: &Binding) {
    let sym = binding.runtime.symbols();
    unsafe { (sym.PyThreadState_Clear)(binding.ptr.as_ptr()) };
    binding
        .runtime
        .locks()
        .set_thread_phase(binding.slot, ThreadPhase::Cleared);
    unsafe { (sym.PyThreadState_DeleteCurrent)() };
    binding.runtime.locks().forget_thread(binding.slot);
    log::debug!(
        "released worker thread state of interpreter {}",
        binding.interp.id()
    );
}

struct RestoreOnDrop<'a> {
    ts: &'a ThreadState,
}

impl Drop for RestoreOnDrop<'_> {
    fn drop(&mut self) {
        unsafe { (self.ts.runtime().symbols().PyEval_RestoreThread)(self.ts.as_ptr()) };
        self.ts.mark(ThreadPhase::Attached);
    }
}

/// A thread state that has given up the lock. May be restored on any thread.
pub struct SavedThread {
    binding: Binding,
}

// Save/restore is the handoff mechanism; the state is not touched while saved.
unsafe impl Send for SavedThread {}

impl SavedThread {
    /// Reacquires the lock and makes the state current (`PyEval_RestoreThread`).
    pub fn restore(self) -> ThreadState {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the binding moves out exactly once.
        let binding = unsafe { std::ptr::read(&this.binding) };
        debug_assert_eq!(
            binding.runtime.locks().thread_phase(binding.slot),
            Some(ThreadPhase::Saved),
            "restoring a thread state the runtime no longer tracks as saved"
        );
        unsafe { (binding.runtime.symbols().PyEval_RestoreThread)(binding.ptr.as_ptr()) };
        binding
            .runtime
            .locks()
            .set_thread_phase(binding.slot, ThreadPhase::Attached);
        ThreadState::bound(binding)
    }

    pub fn role(&self) -> ThreadRole {
        self.binding.role
    }

    pub fn interpreter(&self) -> &InterpreterRef {
        &self.binding.interp
    }

    pub fn as_ptr(&self) -> *mut PyThreadState {
        self.binding.ptr.as_ptr()
    }
}

impl Drop for SavedThread {
    fn drop(&mut self) {
        match self.binding.role {
            ThreadRole::Worker => {
                let sym = self.binding.runtime.symbols();
                unsafe { (sym.PyEval_RestoreThread)(self.binding.ptr.as_ptr()) };
                release_worker(&self.binding);
            }
            role => log::warn!("saved {role:?} thread state dropped without restore"),
        }
    }
}
