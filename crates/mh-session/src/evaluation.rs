use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mh_registry::{method, Params};
use mh_sampler::SamplerChain;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{malformed, LlmError, Result, ValidationError};
use crate::grammar::GrammarEvaluationState;
use crate::sampling::{SamplingOverrides, SamplingParams};

/// Per-call options for `Context::evaluate`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateOptions {
    /// Overrides of the context's sampling defaults for this call only.
    #[serde(flatten)]
    pub sampling: SamplingOverrides,
    /// Stop after this many generated tokens. Unset means "until EOS or the
    /// context is full".
    pub max_tokens: Option<usize>,
    /// Tokens the repetition penalties look at instead of the history.
    pub repeat_penalty_tokens: Option<Vec<u32>>,
    /// Seed for the local weighted draw. Falls back to the context seed.
    pub seed: Option<i64>,
}

impl EvaluateOptions {
    pub fn from_value(value: Value) -> std::result::Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::Options(e.to_string()))
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::Options(e.to_string()))
    }

    pub fn max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }
}

/// Cooperative stop signal for an evaluation stream.
///
/// Clones share one flag. Once set, the stream ends before issuing its next
/// backend call; a step already in flight completes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct StepParams<'a> {
    history: &'a [u32],
    #[serde(flatten)]
    state: &'a GrammarEvaluationState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepReply {
    token_id: Option<u32>,
    probabilities: Option<Vec<f32>>,
}

/// A lazy stream of generated tokens.
///
/// Each call to `next` issues at most one `llm.evaluateStep`, samples the
/// next token, appends it to the context history and yields it. Nothing
/// happens between pulls, so dropping the stream (or simply not pulling)
/// stops generation. The stream ends on the model's EOS token, after
/// `max_tokens`, when the context is full, or when its `StopHandle` fires.
/// A backend error is yielded once and ends the stream; tokens already
/// yielded stay in the history.
pub struct Evaluation<'c> {
    context: &'c mut Context,
    sampling: SamplingParams,
    chain: SamplerChain,
    max_tokens: Option<usize>,
    emitted: usize,
    stop: StopHandle,
    done: bool,
}

impl<'c> Evaluation<'c> {
    pub(crate) fn start(
        context: &'c mut Context,
        prompt: &str,
        options: EvaluateOptions,
    ) -> Result<Evaluation<'c>> {
        let sampling = context.sampling().overridden(&options.sampling);
        sampling.validate()?;

        if !prompt.is_empty() {
            let tokens = context.tokenize(prompt)?;
            let needed = context.history().len() + tokens.len();
            if needed > context.size() as usize {
                return Err(ValidationError::ContextOverflow {
                    size: context.size(),
                    needed,
                }
                .into());
            }
            context.extend_history(&tokens);
        }

        let seed = options.seed.or(context.seed());
        let penalty_tokens = options
            .repeat_penalty_tokens
            .as_deref()
            .unwrap_or(context.history());
        let chain = sampling.sampler_chain(seed, penalty_tokens);

        debug!(
            context = %context.handle(),
            history = context.history().len(),
            samplers = ?chain.names(),
            "evaluation started"
        );

        Ok(Evaluation {
            context,
            sampling,
            chain,
            max_tokens: options.max_tokens,
            emitted: 0,
            stop: StopHandle::new(),
            done: false,
        })
    }

    /// A handle that ends this stream from anywhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Share an externally created stop signal.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Effective sampling parameters of this stream.
    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    /// Number of tokens yielded so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    fn exhausted(&self) -> bool {
        self.stop.is_stopped()
            || self.max_tokens.is_some_and(|max| self.emitted >= max)
            || self.context.history().len() >= self.context.size() as usize
    }

    fn step(&mut self) -> Result<Option<u32>> {
        let grammar = self.context.grammar().map(|g| g.as_ref());
        let state = GrammarEvaluationState::new(self.sampling, grammar);
        let params = Params::from_serialize(&StepParams {
            history: self.context.history(),
            state: &state,
        })?;

        let data = self.context.model().registry().call_on(
            self.context.handle(),
            method::EVALUATE_STEP,
            params,
        )?;
        let reply: StepReply =
            serde_json::from_value(data).map_err(|e| malformed(method::EVALUATE_STEP, e))?;

        let token = match (reply.probabilities, reply.token_id) {
            (Some(probabilities), _) if !probabilities.is_empty() => self
                .chain
                .sample_probabilities(&probabilities)
                .ok_or_else(|| malformed(method::EVALUATE_STEP, "no token has probability mass"))?,
            (_, Some(token)) => token,
            _ => {
                return Err(malformed(
                    method::EVALUATE_STEP,
                    "missing tokenId or probabilities",
                ))
            }
        };

        trace!(context = %self.context.handle(), token, "evaluation step");

        if token == self.context.model().token_eos() {
            return Ok(None);
        }

        self.context.push_token(token);
        self.chain.accept(token);
        self.emitted += 1;
        Ok(Some(token))
    }
}

impl Iterator for Evaluation<'_> {
    type Item = std::result::Result<u32, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.exhausted() {
            self.done = true;
            return None;
        }

        match self.step() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Evaluation<'_> {}
