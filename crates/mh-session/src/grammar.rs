use std::sync::Arc;

use mh_registry::{Handle, Params, ResourceKind, ResourceRegistry};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::sampling::SamplingParams;

/// A formal grammar parsed by the backend, restricting which tokens are
/// valid at each generation step.
///
/// A grammar is immutable once parsed and may be shared by many contexts.
pub struct Grammar {
    registry: Arc<ResourceRegistry>,
    handle: Handle,
    text: String,
}

impl Grammar {
    /// Ask the backend to parse `text` (GBNF, as understood by the backend).
    pub fn parse(registry: &Arc<ResourceRegistry>, text: impl Into<String>) -> Result<Grammar> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyGrammar.into());
        }

        let params = Params::new().with("text", text.as_str())?;
        let handle = registry.acquire(ResourceKind::Grammar, params)?.handle;
        debug!(%handle, len = text.len(), "grammar parsed");

        Ok(Grammar {
            registry: Arc::clone(registry),
            handle,
            text,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The grammar source as given to `parse`.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn release(&self) -> Result<()> {
        Ok(self.registry.release(&self.handle)?)
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("handle", &self.handle)
            .field("text", &self.text)
            .finish()
    }
}

/// Sampling state for a single evaluation step.
///
/// Built from the context's defaults and the call's overrides right before
/// each step, sent to the backend with the step request, then dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarEvaluationState {
    #[serde(flatten)]
    pub sampling: SamplingParams,
    #[serde(rename = "grammarId", skip_serializing_if = "Option::is_none")]
    pub grammar: Option<Value>,
}

impl GrammarEvaluationState {
    pub fn new(sampling: SamplingParams, grammar: Option<&Grammar>) -> Self {
        Self {
            sampling,
            grammar: grammar.map(|g| g.handle().wire_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::testing::ScriptedBackend;
    use mh_registry::method;
    use serde_json::json;

    #[test]
    fn test_parse() {
        let backend = ScriptedBackend::new();
        let grammar = Grammar::parse(&backend.registry(), "root ::= \"yes\" | \"no\"").unwrap();
        assert_eq!(grammar.handle().kind(), ResourceKind::Grammar);
        assert_eq!(
            backend.last(method::PARSE_GRAMMAR).unwrap().get("text"),
            Some(&json!("root ::= \"yes\" | \"no\""))
        );
    }

    #[test]
    fn test_empty_text_rejected_locally() {
        let backend = ScriptedBackend::new();
        let err = Grammar::parse(&backend.registry(), "  ").unwrap_err();
        assert!(matches!(err, LlmError::Validation(ValidationError::EmptyGrammar)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_parse_failure() {
        let backend = ScriptedBackend::new();
        backend.fail(method::PARSE_GRAMMAR, "failed to parse");
        let err = Grammar::parse(&backend.registry(), "root ::=").unwrap_err();
        assert_eq!(err.to_string(), "failed to parse");
    }

    #[test]
    fn test_evaluation_state_params() {
        let backend = ScriptedBackend::new();
        let grammar = Grammar::parse(&backend.registry(), "root ::= [a-z]+").unwrap();
        let state = GrammarEvaluationState::new(SamplingParams::default(), Some(&grammar));
        let params = Params::from_serialize(&state).unwrap();
        assert_eq!(params.get("grammarId"), Some(&json!(grammar.handle().id())));
        assert_eq!(params.get("topK"), Some(&json!(40)));
        assert!(params.contains_key("temperature"));

        let state = GrammarEvaluationState::new(SamplingParams::default(), None);
        let params = Params::from_serialize(&state).unwrap();
        assert!(!params.contains_key("grammarId"));
    }
}
