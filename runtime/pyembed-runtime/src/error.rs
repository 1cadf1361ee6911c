use std::ffi::NulError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::object::TypeCategory;
use crate::state::RuntimePhase;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("failed to load {path}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },

    #[error("symbol {symbol} not found in {library}")]
    SymbolNotFound { symbol: String, library: String },

    #[error("unsupported runtime version {found} (need {expected}.x)")]
    VersionMismatch { expected: &'static str, found: String },

    #[error("cannot locate the runtime: {0}")]
    Discovery(String),

    #[error("a runtime is already loaded in this process")]
    AlreadyLoaded,

    #[error("call descriptor for {entry}: {reason}")]
    Descriptor { entry: &'static str, reason: String },

    #[error("{}", status_text(.func, .message))]
    Status {
        func: Option<String>,
        message: Option<String>,
    },

    #[error("runtime requested process exit with code {code}")]
    ExitRequested { code: i32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("setup already failed at {0:?}; refusing to retry")]
    SetupAborted(RuntimePhase),

    #[error("invalid lifecycle state: {0}")]
    InvalidState(String),

    #[error("{kind}: {message}")]
    Python { kind: String, message: String },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: TypeCategory,
    },

    #[error("interior nul byte in string argument")]
    Nul(#[from] NulError),
}

impl EmbedError {
    /// Exit code the host should adopt, if the runtime asked to exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitRequested { code } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// A consuming call that was turned down before it touched the runtime. The
/// value comes back unchanged, still usable.
pub struct Refused<T> {
    value: T,
    error: EmbedError,
}

impl<T> Refused<T> {
    pub(crate) fn new(value: T, error: EmbedError) -> Self {
        Self { value, error }
    }

    pub fn error(&self) -> &EmbedError {
        &self.error
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, EmbedError) {
        (self.value, self.error)
    }
}

impl<T> fmt::Debug for Refused<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refused")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Refused<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refused: {}", self.error)
    }
}

impl<T> std::error::Error for Refused<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<Refused<T>> for EmbedError {
    fn from(refused: Refused<T>) -> Self {
        refused.error
    }
}

fn status_text(func: &Option<String>, message: &Option<String>) -> String {
    let message = message.as_deref().unwrap_or("unknown error");
    match func {
        Some(func) => format!("{func}: {message}"),
        None => message.to_string(),
    }
}
