//! `mh-session` - models, evaluation contexts and token streams backed by an
//! out-of-process inference backend.
//!
//! A [`Model`] validates load options and acquires a model handle. A
//! [`Context`] binds an evaluation session to a model and owns the token
//! history. [`Context::evaluate`] returns an [`Evaluation`], a lazy iterator
//! that issues one backend step per pulled token.

pub mod context;
pub mod error;
pub mod evaluation;
pub mod grammar;
pub mod model;
pub mod sampling;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{Context, ContextOptions};
pub use error::{LlmError, Result, ValidationError};
pub use evaluation::{EvaluateOptions, Evaluation, StopHandle};
pub use grammar::{Grammar, GrammarEvaluationState};
pub use model::{Model, ModelOptions, ModelParams};
pub use sampling::SamplingParams;

pub use mh_registry::{Handle, ResourceKind, ResourceRegistry, Transport};
