//! Running host threads inside an interpreter.

use std::io;
use std::thread::{self, JoinHandle, Scope, ScopedJoinHandle};

use super::thread_state::{InterpreterRef, ThreadState};
use crate::error::Result;

/// Attaches a worker thread state for the calling thread, runs `f` with it,
/// and releases it afterwards, also when `f` unwinds.
pub fn attach_current<F, R>(interp: &InterpreterRef, f: F) -> Result<R>
where
    F: FnOnce(&ThreadState) -> R,
{
    let ts = interp.attach()?;
    let out = f(&ts);
    ts.release()?;
    Ok(out)
}

/// Spawns a named OS thread that runs `f` attached to `interp`.
pub fn spawn_attached<F, R>(
    interp: &InterpreterRef,
    name: impl Into<String>,
    f: F,
) -> io::Result<JoinHandle<Result<R>>>
where
    F: FnOnce(&ThreadState) -> R + Send + 'static,
    R: Send + 'static,
{
    let interp = interp.clone();
    thread::Builder::new()
        .name(name.into())
        .spawn(move || attach_current(&interp, f))
}

/// Like [`spawn_attached`] inside a [`std::thread::scope`], so `f` may borrow.
pub fn spawn_scoped_attached<'scope, 'env, F, R>(
    scope: &'scope Scope<'scope, 'env>,
    interp: &InterpreterRef,
    name: impl Into<String>,
    f: F,
) -> io::Result<ScopedJoinHandle<'scope, Result<R>>>
where
    F: FnOnce(&ThreadState) -> R + Send + 'scope,
    R: Send + 'scope,
{
    let interp = interp.clone();
    thread::Builder::new()
        .name(name.into())
        .spawn_scoped(scope, move || attach_current(&interp, f))
}
