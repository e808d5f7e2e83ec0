use mh_registry::{BackendError, Handle, RegistryError, SerializationError};
use thiserror::Error;

/// Malformed or missing construction parameters. Raised locally, before any
/// backend call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("path required")]
    PathRequired,
    #[error("{name} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        min: f32,
        max: f32,
        value: f32,
    },
    #[error("{name} must be a finite, non-negative number, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("{name} must be a finite number, got {value}")]
    NotFinite { name: &'static str, value: f32 },
    #[error("temperature {0} is too small; use 0 for greedy selection")]
    TemperatureTooSmall(f32),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("prompt needs {needed} tokens but the context holds {size}")]
    ContextOverflow { size: u32, needed: usize },
    #[error("grammar text is empty")]
    EmptyGrammar,
    #[error("invalid options: {0}")]
    Options(String),
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("unknown or released handle: {0}")]
    UnknownHandle(Handle),
}

impl From<RegistryError> for LlmError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Backend(e) => LlmError::Backend(e),
            RegistryError::Serialization(e) => LlmError::Serialization(e),
            RegistryError::UnknownHandle(h) => LlmError::UnknownHandle(h),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Shorthand for a backend error describing a reply we could not interpret.
pub(crate) fn malformed(method: &str, detail: impl std::fmt::Display) -> LlmError {
    LlmError::Backend(BackendError::new(format!(
        "malformed reply from {}: {}",
        method, detail
    )))
}
