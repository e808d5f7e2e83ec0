use std::sync::Arc;

use mh_registry::{method, Handle, Params, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{malformed, LlmError, Result, ValidationError};
use crate::evaluation::{EvaluateOptions, Evaluation};
use crate::grammar::Grammar;
use crate::model::Model;
use crate::sampling::{SamplingOverrides, SamplingParams};

/// Options accepted by `Context::create`.
///
/// Unset runtime fields fall back to the model's resolved parameters.
/// Sampling fields become the context's defaults for every evaluation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextOptions {
    /// Values below -1 are clamped to -1 ("unset/random").
    pub seed: Option<i64>,
    pub context_size: Option<u32>,
    pub batch_size: Option<u32>,
    pub logits_all: Option<bool>,
    pub embedding: Option<bool>,
    pub threads: Option<u32>,
    /// Push the model's BOS token before any prompt. Defaults to true.
    pub prepend_bos: Option<bool>,
    #[serde(flatten)]
    pub sampling: SamplingOverrides,
    /// Grammar constraining every evaluation of this context.
    #[serde(skip)]
    pub grammar: Option<Arc<Grammar>>,
}

impl ContextOptions {
    pub fn from_value(value: Value) -> std::result::Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::Options(e.to_string()))
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::Options(e.to_string()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    model_id: Value,
    seed: Option<i64>,
    context_size: u32,
    batch_size: Option<u32>,
    logits_all: Option<bool>,
    embedding: Option<bool>,
    threads: u32,
}

/// An evaluation session bound to one model.
///
/// The context exclusively owns its token history. Only its own evaluation
/// stream appends to it, and `evaluate` borrows the context mutably, so two
/// evaluations can never run on one context at the same time.
pub struct Context {
    model: Arc<Model>,
    handle: Handle,
    grammar: Option<Arc<Grammar>>,
    sampling: SamplingParams,
    seed: Option<i64>,
    context_size: u32,
    prepend_bos: bool,
    logits_all: bool,
    embedding: bool,
    history: Vec<u32>,
}

impl Context {
    pub fn create(model: &Arc<Model>, options: ContextOptions) -> Result<Context> {
        let defaults = model.params();

        let sampling = defaults.sampling().overridden(&options.sampling);
        sampling.validate()?;

        let context_size = options.context_size.unwrap_or(defaults.context_size);
        if context_size == 0 {
            return Err(ValidationError::Zero("contextSize").into());
        }
        let threads = options.threads.unwrap_or(defaults.threads);
        if threads == 0 {
            return Err(ValidationError::Zero("threads").into());
        }

        let seed = options.seed.or(defaults.seed).map(|seed| seed.max(-1));
        let prepend_bos = options.prepend_bos.unwrap_or(true);

        let registry = model.registry();
        if !registry.is_live(model.handle()) {
            return Err(LlmError::UnknownHandle(model.handle().clone()));
        }

        let request = CreateParams {
            model_id: model.handle().wire_id(),
            seed,
            context_size,
            batch_size: options.batch_size.or(defaults.batch_size),
            logits_all: options.logits_all,
            embedding: options.embedding.or(defaults.embedding),
            threads,
        };
        let handle = registry.acquire_with(ResourceKind::Context, &request)?.handle;
        debug!(%handle, model = %model.handle(), context_size, "context created");

        let mut context = Context {
            model: Arc::clone(model),
            handle,
            grammar: options.grammar,
            sampling,
            seed,
            context_size,
            prepend_bos,
            logits_all: options.logits_all.unwrap_or(false),
            embedding: request.embedding.unwrap_or(false),
            history: Vec::new(),
        };
        context.apply_prepend_policy();

        Ok(context)
    }

    fn apply_prepend_policy(&mut self) {
        if self.prepend_bos {
            self.history.push(self.model.token_bos());
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn grammar(&self) -> Option<&Arc<Grammar>> {
        self.grammar.as_ref()
    }

    /// Sampling defaults applied to every evaluation unless overridden.
    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    /// The clamped seed sent to the backend, if any.
    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    /// Maximum number of tokens the history may hold.
    pub fn size(&self) -> u32 {
        self.context_size
    }

    pub fn prepends_bos(&self) -> bool {
        self.prepend_bos
    }

    pub fn logits_all(&self) -> bool {
        self.logits_all
    }

    pub fn embedding(&self) -> bool {
        self.embedding
    }

    /// Every token fed to or produced by this context, in order.
    pub fn history(&self) -> &[u32] {
        &self.history
    }

    pub(crate) fn push_token(&mut self, token: u32) {
        self.history.push(token);
    }

    pub(crate) fn extend_history(&mut self, tokens: &[u32]) {
        self.history.extend_from_slice(tokens);
    }

    /// Start an independent prompt: clear the history and re-apply the
    /// prepend policy.
    pub fn reset(&mut self) {
        self.history.clear();
        self.apply_prepend_policy();
    }

    /// Tokenize `text` with the backend's tokenizer. The history is untouched.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let params = Params::new().with("text", text)?;
        let data = self
            .model
            .registry()
            .call_on(&self.handle, method::TOKENIZE, params)?;

        let tokens = match data {
            Value::Object(mut map) => map.remove("tokens").unwrap_or(Value::Null),
            other => other,
        };
        serde_json::from_value(tokens).map_err(|e| malformed(method::TOKENIZE, e))
    }

    /// Render tokens back to text.
    pub fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        let params = Params::new().with("tokens", tokens.to_vec())?;
        let data = self
            .model
            .registry()
            .call_on(&self.handle, method::DETOKENIZE, params)?;

        match data {
            Value::String(text) => Ok(text),
            Value::Object(mut map) => match map.remove("text") {
                Some(Value::String(text)) => Ok(text),
                _ => Err(malformed(method::DETOKENIZE, "missing text")),
            },
            _ => Err(malformed(method::DETOKENIZE, "expected a string")),
        }
    }

    /// Feed `prompt` and stream generated tokens.
    ///
    /// The prompt is tokenized and appended to the history immediately;
    /// generation itself only happens as the returned stream is consumed.
    pub fn evaluate(&mut self, prompt: &str, options: EvaluateOptions) -> Result<Evaluation<'_>> {
        Evaluation::start(self, prompt, options)
    }

    pub fn release(&self) -> Result<()> {
        Ok(self.model.registry().release(&self.handle)?)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .field("model", self.model.handle())
            .field("sampling", &self.sampling)
            .field("context_size", &self.context_size)
            .field("history", &self.history.len())
            .finish()
    }
}
