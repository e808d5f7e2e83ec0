use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;
use crate::params::Params;

/// Backend method names.
pub mod method {
    pub const CREATE_MODEL: &str = "llm.createModel";
    pub const CREATE_CONTEXT: &str = "llm.createContext";
    pub const PARSE_GRAMMAR: &str = "llm.parseGrammar";
    pub const RELEASE: &str = "llm.release";
    pub const TOKEN_BOS: &str = "llm.tokenBos";
    pub const TOKEN_EOS: &str = "llm.tokenEos";
    pub const TOKEN_NL: &str = "llm.tokenNl";
    pub const TOKEN_TEXT: &str = "llm.tokenText";
    pub const TOKENIZE: &str = "llm.tokenize";
    pub const DETOKENIZE: &str = "llm.detokenize";
    pub const EVALUATE_STEP: &str = "llm.evaluateStep";
}

/// Synchronous request/response channel to the inference backend.
///
/// Implementations block until the backend answers. Transport-level failures
/// (a broken pipe, a malformed reply) are reported as an envelope error.
pub trait Transport: Send + Sync {
    fn call(&self, method: &str, params: &Params) -> Envelope;
}

/// The `{data, error}` reply of every backend call.
///
/// When `error` is present the call failed and `data` must be ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, alias = "err", skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Envelope {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(Value::String(message.into())),
        }
    }

    /// Decode an envelope from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, BackendError> {
        serde_json::from_str(text)
            .map_err(|e| BackendError::new(format!("malformed backend reply: {}", e)))
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Resolve to the payload, or to the backend's error message.
    ///
    /// String errors are passed through verbatim; structured errors are
    /// rendered as compact JSON. A successful reply without data yields `null`.
    pub fn into_result(self) -> Result<Value, BackendError> {
        match self.error {
            Some(Value::String(message)) => Err(BackendError::new(message)),
            Some(other) => Err(BackendError::new(other.to_string())),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}
