//! Process-wide bookkeeping for the runtime lock: lifecycle phase, live
//! thread states and live sub-interpreters.

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};
use pyembed_abi::GilMode;

use crate::error::{EmbedError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuntimePhase {
    Unloaded,
    LibraryLoaded,
    PreInitialized,
    Initialized,
    Finalized,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadRole {
    /// Created by initialization; finalizing goes through it.
    Main,
    /// Created together with a sub-interpreter; ending the interpreter consumes it.
    InterpreterRoot,
    /// Created by the host for an extra OS thread.
    Worker,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadPhase {
    Attached,
    Saved,
    Cleared,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterpreterPhase {
    Created,
    Running,
    Ended,
}

#[derive(Copy, Clone, Debug)]
struct TrackedThread {
    role: ThreadRole,
    interp: i64,
    phase: ThreadPhase,
}

#[derive(Copy, Clone, Debug)]
struct TrackedInterpreter {
    gil: GilMode,
    phase: InterpreterPhase,
}

struct LockState {
    phase: RuntimePhase,
    aborted: bool,
    next_slot: u64,
    threads: HashMap<u64, TrackedThread>,
    interpreters: HashMap<i64, TrackedInterpreter>,
}

impl LockState {
    fn workers_of(&self, id: i64) -> usize {
        self.threads
            .values()
            .filter(|t| t.interp == id && t.role == ThreadRole::Worker)
            .count()
    }
}

/// Owned by the `Runtime`; exists from `LibraryLoaded` until `Finalized`.
pub struct LockManager {
    state: Mutex<LockState>,
    /// Signalled whenever a thread state stops being tracked.
    forgotten: Condvar,
}

impl LockManager {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                phase: RuntimePhase::LibraryLoaded,
                aborted: false,
                next_slot: 1,
                threads: HashMap::new(),
                interpreters: HashMap::new(),
            }),
            forgotten: Condvar::new(),
        }
    }

    pub fn phase(&self) -> RuntimePhase {
        self.state.lock().phase
    }

    /// Fails unless the runtime sits in `expected` and no earlier step aborted.
    pub(crate) fn expect(&self, expected: RuntimePhase) -> Result<()> {
        let state = self.state.lock();
        if state.aborted {
            return Err(EmbedError::SetupAborted(state.phase));
        }
        if state.phase != expected {
            return Err(EmbedError::invalid_state(format!(
                "runtime is {:?}, expected {expected:?}",
                state.phase
            )));
        }
        Ok(())
    }

    pub(crate) fn advance(&self, from: RuntimePhase, to: RuntimePhase) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase != from {
            return Err(EmbedError::invalid_state(format!(
                "cannot move to {to:?} from {:?}",
                state.phase
            )));
        }
        state.phase = to;
        Ok(())
    }

    /// Marks the setup sequence as failed; every later step is refused.
    pub(crate) fn abort(&self) {
        self.state.lock().aborted = true;
    }

    pub(crate) fn register_thread(&self, role: ThreadRole, interp: i64) -> u64 {
        let mut state = self.state.lock();
        let slot = state.next_slot;
        state.next_slot += 1;
        state.threads.insert(
            slot,
            TrackedThread {
                role,
                interp,
                phase: ThreadPhase::Attached,
            },
        );
        slot
    }

    pub(crate) fn set_thread_phase(&self, slot: u64, phase: ThreadPhase) {
        if let Some(thread) = self.state.lock().threads.get_mut(&slot) {
            thread.phase = phase;
        }
    }

    pub(crate) fn thread_phase(&self, slot: u64) -> Option<ThreadPhase> {
        self.state.lock().threads.get(&slot).map(|t| t.phase)
    }

    pub(crate) fn forget_thread(&self, slot: u64) {
        self.state.lock().threads.remove(&slot);
        self.forgotten.notify_all();
    }

    pub(crate) fn register_interpreter(&self, id: i64, gil: GilMode) {
        self.state.lock().interpreters.insert(
            id,
            TrackedInterpreter {
                gil,
                phase: InterpreterPhase::Created,
            },
        );
    }

    /// Ended interpreters are dropped from the registry; ids are never reused.
    pub(crate) fn set_interpreter_phase(&self, id: i64, phase: InterpreterPhase) {
        let mut state = self.state.lock();
        if phase == InterpreterPhase::Ended {
            state.interpreters.remove(&id);
        } else if let Some(interp) = state.interpreters.get_mut(&id) {
            interp.phase = phase;
        }
    }

    pub fn interpreter_phase(&self, id: i64) -> Option<InterpreterPhase> {
        self.state.lock().interpreters.get(&id).map(|i| i.phase)
    }

    pub fn interpreter_gil(&self, id: i64) -> Option<GilMode> {
        self.state.lock().interpreters.get(&id).map(|i| i.gil)
    }

    /// Worker thread states still alive inside interpreter `id`.
    pub fn workers_of(&self, id: i64) -> usize {
        self.state.lock().workers_of(id)
    }

    /// Blocks until interpreter `id` has no worker thread states left.
    pub(crate) fn wait_for_workers(&self, id: i64) {
        let mut state = self.state.lock();
        while state.workers_of(id) > 0 {
            self.forgotten.wait(&mut state);
        }
    }

    pub fn live_thread_states(&self) -> usize {
        self.state.lock().threads.len()
    }

    pub fn live_sub_interpreters(&self) -> usize {
        self.state
            .lock()
            .interpreters
            .values()
            .filter(|i| i.phase != InterpreterPhase::Ended)
            .count()
    }

    /// Finalizing needs the main thread state alone: no sub-interpreter and
    /// no other thread state may remain.
    pub(crate) fn check_finalize_ready(&self, main_slot: u64) -> Result<()> {
        let state = self.state.lock();
        if state.phase != RuntimePhase::Initialized {
            return Err(EmbedError::invalid_state(format!(
                "cannot finalize a {:?} runtime",
                state.phase
            )));
        }
        let running = state
            .interpreters
            .values()
            .filter(|i| i.phase != InterpreterPhase::Ended)
            .count();
        if running > 0 {
            return Err(EmbedError::invalid_state(format!(
                "{running} sub-interpreter(s) still running"
            )));
        }
        let others = state.threads.keys().filter(|slot| **slot != main_slot).count();
        if others > 0 {
            return Err(EmbedError::invalid_state(format!(
                "{others} thread state(s) still alive"
            )));
        }
        Ok(())
    }

    pub(crate) fn teardown(&self) {
        let mut state = self.state.lock();
        state.phase = RuntimePhase::Finalized;
        state.threads.clear();
        state.interpreters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let locks = LockManager::new();
        assert_eq!(locks.phase(), RuntimePhase::LibraryLoaded);
        locks.expect(RuntimePhase::LibraryLoaded).unwrap();
        locks
            .advance(RuntimePhase::LibraryLoaded, RuntimePhase::PreInitialized)
            .unwrap();
        assert!(locks.expect(RuntimePhase::LibraryLoaded).is_err());
        assert!(
            locks
                .advance(RuntimePhase::LibraryLoaded, RuntimePhase::PreInitialized)
                .is_err()
        );
        locks
            .advance(RuntimePhase::PreInitialized, RuntimePhase::Initialized)
            .unwrap();
        assert_eq!(locks.phase(), RuntimePhase::Initialized);
    }

    #[test]
    fn aborted_setup_refuses_retry() {
        let locks = LockManager::new();
        locks.abort();
        match locks.expect(RuntimePhase::LibraryLoaded) {
            Err(EmbedError::SetupAborted(RuntimePhase::LibraryLoaded)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn finalize_waits_for_workers_and_interpreters() {
        let locks = LockManager::new();
        locks
            .advance(RuntimePhase::LibraryLoaded, RuntimePhase::PreInitialized)
            .unwrap();
        locks
            .advance(RuntimePhase::PreInitialized, RuntimePhase::Initialized)
            .unwrap();
        let main = locks.register_thread(ThreadRole::Main, 0);
        locks.check_finalize_ready(main).unwrap();

        locks.register_interpreter(1, GilMode::Shared);
        let root = locks.register_thread(ThreadRole::InterpreterRoot, 1);
        let worker = locks.register_thread(ThreadRole::Worker, 1);
        assert_eq!(locks.workers_of(1), 1);
        assert_eq!(locks.live_sub_interpreters(), 1);
        assert!(locks.check_finalize_ready(main).is_err());

        locks.forget_thread(worker);
        locks.forget_thread(root);
        locks.set_interpreter_phase(1, InterpreterPhase::Ended);
        assert_eq!(locks.live_sub_interpreters(), 0);
        assert_eq!(locks.interpreter_phase(1), None);
        assert_eq!(locks.live_thread_states(), 1);
        locks.check_finalize_ready(main).unwrap();

        locks.teardown();
        assert_eq!(locks.phase(), RuntimePhase::Finalized);
        assert_eq!(locks.live_thread_states(), 0);
    }

    #[test]
    fn ended_interpreters_leave_the_registry() {
        let locks = LockManager::new();
        for id in 1..=64 {
            locks.register_interpreter(id, GilMode::Owned);
            locks.set_interpreter_phase(id, InterpreterPhase::Running);
            assert_eq!(locks.interpreter_gil(id), Some(GilMode::Owned));
            locks.set_interpreter_phase(id, InterpreterPhase::Ended);
        }
        assert_eq!(locks.state.lock().interpreters.len(), 0);
        // A late phase update for an ended id does not bring it back.
        locks.set_interpreter_phase(7, InterpreterPhase::Running);
        assert_eq!(locks.interpreter_phase(7), None);
    }

    #[test]
    fn waiting_for_workers_returns_once_they_are_forgotten() {
        let locks = std::sync::Arc::new(LockManager::new());
        locks.register_interpreter(2, GilMode::Shared);
        let workers: Vec<u64> = (0..3)
            .map(|_| locks.register_thread(ThreadRole::Worker, 2))
            .collect();
        let other = locks.register_thread(ThreadRole::Worker, 5);
        let releaser = {
            let locks = locks.clone();
            std::thread::spawn(move || {
                for slot in workers {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    locks.forget_thread(slot);
                }
            })
        };
        locks.wait_for_workers(2);
        assert_eq!(locks.workers_of(2), 0);
        assert_eq!(locks.workers_of(5), 1);
        releaser.join().unwrap();
        locks.forget_thread(other);
    }

    #[test]
    fn thread_phase_updates_are_tracked() {
        let locks = LockManager::new();
        let slot = locks.register_thread(ThreadRole::Worker, 3);
        assert_eq!(locks.thread_phase(slot), Some(ThreadPhase::Attached));
        locks.set_thread_phase(slot, ThreadPhase::Saved);
        assert_eq!(locks.thread_phase(slot), Some(ThreadPhase::Saved));
        locks.forget_thread(slot);
        assert_eq!(locks.thread_phase(slot), None);
    }
}
