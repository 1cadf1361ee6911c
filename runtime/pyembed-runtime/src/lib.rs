//! pyembed runtime
//! Loads libpython 3.12 at run time and drives its interpreter, thread-state
//! and GIL lifecycle from a multithreaded host.

pub mod call;
pub mod concurrency;
pub mod error;
pub mod eval;
pub mod loader;
pub mod locate;
pub mod object;
pub mod state;
pub mod text;

pub use call::{Status, StatusKind};
pub use concurrency::{
    InterpreterRef, PyToken, SavedThread, SubInterpreter, ThreadState, attach_current,
    spawn_attached, spawn_scoped_attached,
};
pub use error::{EmbedError, Refused, Result};
pub use locate::EmbedSettings;
pub use object::{AsPyPtr, Borrowed, CallFlags, HostFunction, PyRef, TypeCategory};
pub use pyembed_abi::{GilMode, MemAllocator, OptimizeLevel, StartToken};
pub use state::{
    InitConfig, InterpreterPhase, PreInitConfig, Runtime, RuntimePhase, SubInterpreterConfig,
    ThreadPhase, ThreadRole,
};
