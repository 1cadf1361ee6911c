pub mod config;
pub(crate) mod lifecycle;
pub mod registry;
pub(crate) mod runtime;
pub(crate) mod tls;

pub use config::{InitConfig, PreInitConfig, SubInterpreterConfig};
pub use registry::{InterpreterPhase, LockManager, RuntimePhase, ThreadPhase, ThreadRole};
pub use runtime::Runtime;
pub use tls::gil_depth;
