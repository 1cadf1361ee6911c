pub mod gil;
pub mod interpreters;
pub mod thread_state;
pub mod threads;

pub use gil::PyToken;
pub(crate) use gil::gil_assert;
pub use interpreters::SubInterpreter;
pub use thread_state::{InterpreterRef, SavedThread, ThreadState};
pub use threads::{attach_current, spawn_attached, spawn_scoped_attached};
