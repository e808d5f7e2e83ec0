use thiserror::Error;

use crate::handle::Handle;

/// A failure reported by the backend. The message is passed through verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Parameters that cannot be expressed as a flat mapping of primitives.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("parameters must serialize to a mapping, got {0}")]
    NotAMapping(&'static str),
    #[error("parameter '{0}' is a nested object")]
    NestedObject(String),
    #[error("parameter '{0}' nests arrays or objects inside an array")]
    NestedArray(String),
    #[error("failed to encode parameters: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("unknown or released handle: {0}")]
    UnknownHandle(Handle),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
