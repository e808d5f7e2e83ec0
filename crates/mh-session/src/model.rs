use std::sync::Arc;

use mh_registry::{method, Handle, Params, ResourceKind, ResourceRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{malformed, Result, ValidationError};
use crate::sampling::{SamplingParams, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P};

pub const DEFAULT_CONTEXT_SIZE: u32 = 4096;
pub const DEFAULT_THREADS: u32 = 6;

/// Options accepted by `Model::create`.
///
/// Every field is optional; unset fields take the documented defaults when
/// resolved. Deserializes from a camelCase JSON object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelOptions {
    /// Path to the model on the backend's filesystem. Required.
    pub path: Option<String>,
    /// `None` lets the backend pick a random seed.
    pub seed: Option<i64>,
    /// Text context size. Defaults to 4096.
    pub context_size: Option<u32>,
    /// Prompt processing batch size.
    pub batch_size: Option<u32>,
    /// Number of layers to store in VRAM.
    pub gpu_layers: Option<i32>,
    /// Threads used to evaluate tokens. Defaults to 6.
    pub threads: Option<u32>,
    /// Defaults to 0 (always pick the most likely token).
    pub temperature: Option<f32>,
    /// Defaults to 40; 0 uses the full vocabulary.
    pub top_k: Option<u32>,
    /// Defaults to 0.95; must lie in [0, 1]; 1 disables nucleus filtering.
    pub top_p: Option<f32>,
    /// Only load the vocabulary, no weights.
    pub vocab_only: Option<bool>,
    /// Use mmap if possible.
    pub use_mmap: Option<bool>,
    /// Force the system to keep the model in RAM.
    pub use_mlock: Option<bool>,
    pub embedding: Option<bool>,
}

impl ModelOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Decode options from a JSON value. Type mismatches, such as a
    /// fractional seed, are validation errors.
    pub fn from_value(value: Value) -> std::result::Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::Options(e.to_string()))
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::Options(e.to_string()))
    }

    /// Validate and fill in defaults.
    pub fn resolve(self) -> std::result::Result<ModelParams, ValidationError> {
        let path = match self.path {
            Some(path) if !path.is_empty() => path,
            _ => return Err(ValidationError::PathRequired),
        };

        let params = ModelParams {
            path,
            seed: self.seed,
            context_size: self.context_size.unwrap_or(DEFAULT_CONTEXT_SIZE),
            batch_size: self.batch_size,
            gpu_layers: self.gpu_layers,
            threads: self.threads.unwrap_or(DEFAULT_THREADS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            top_p: self.top_p.unwrap_or(DEFAULT_TOP_P),
            vocab_only: self.vocab_only,
            use_mmap: self.use_mmap,
            use_mlock: self.use_mlock,
            embedding: self.embedding,
        };

        if params.context_size == 0 {
            return Err(ValidationError::Zero("contextSize"));
        }
        if params.threads == 0 {
            return Err(ValidationError::Zero("threads"));
        }
        params.sampling().validate()?;

        Ok(params)
    }
}

/// The resolved parameter set of a loaded model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub path: String,
    pub seed: Option<i64>,
    pub context_size: u32,
    pub batch_size: Option<u32>,
    pub gpu_layers: Option<i32>,
    pub threads: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub vocab_only: Option<bool>,
    pub use_mmap: Option<bool>,
    pub use_mlock: Option<bool>,
    pub embedding: Option<bool>,
}

impl ModelParams {
    /// Sampling defaults inherited by contexts of this model.
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            ..SamplingParams::default()
        }
    }
}

/// Structural load flags: the only parameters sent with `llm.createModel`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadParams<'a> {
    path: &'a str,
    gpu_layers: Option<i32>,
    vocab_only: Option<bool>,
    use_mmap: Option<bool>,
    use_mlock: Option<bool>,
}

/// A model loaded by the backend.
pub struct Model {
    registry: Arc<ResourceRegistry>,
    handle: Handle,
    params: ModelParams,
    bos: u32,
    eos: u32,
}

impl Model {
    /// Validate `options`, then ask the backend to load the model.
    ///
    /// Sampling options are resolved and kept on the model but are never
    /// sent with the load request.
    pub fn create(registry: &Arc<ResourceRegistry>, options: ModelOptions) -> Result<Model> {
        let params = options.resolve()?;

        let load = LoadParams {
            path: &params.path,
            gpu_layers: params.gpu_layers,
            vocab_only: params.vocab_only,
            use_mmap: params.use_mmap,
            use_mlock: params.use_mlock,
        };
        let handle = registry.acquire_with(ResourceKind::Model, &load)?.handle;

        let special = special_token(registry, &handle, method::TOKEN_BOS)
            .and_then(|bos| Ok((bos, special_token(registry, &handle, method::TOKEN_EOS)?)));
        let (bos, eos) = match special {
            Ok(tokens) => tokens,
            Err(e) => {
                if let Err(release_err) = registry.release(&handle) {
                    warn!(%handle, error = %release_err, "failed to release model after load error");
                }
                return Err(e);
            }
        };

        debug!(%handle, path = %params.path, bos, eos, "model loaded");

        Ok(Model {
            registry: Arc::clone(registry),
            handle,
            params,
            bos,
            eos,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Metadata the backend reported when loading the model.
    pub fn metadata(&self) -> Option<Map<String, Value>> {
        self.registry.metadata(&self.handle)
    }

    /// Beginning-of-sequence token id.
    pub fn token_bos(&self) -> u32 {
        self.bos
    }

    /// End-of-sequence token id.
    pub fn token_eos(&self) -> u32 {
        self.eos
    }

    /// Newline token id.
    pub fn token_nl(&self) -> Result<u32> {
        special_token(&self.registry, &self.handle, method::TOKEN_NL)
    }

    /// The vocabulary text of a single token.
    pub fn token_text(&self, token: u32) -> Result<String> {
        let params = Params::new().with("token", token)?;
        let data = self
            .registry
            .call_on(&self.handle, method::TOKEN_TEXT, params)?;
        match data {
            Value::String(text) => Ok(text),
            Value::Object(mut map) => match map.remove("text") {
                Some(Value::String(text)) => Ok(text),
                _ => Err(malformed(method::TOKEN_TEXT, "missing text")),
            },
            _ => Err(malformed(method::TOKEN_TEXT, "expected a string")),
        }
    }

    /// Release the backend model. Contexts created from it stop working.
    pub fn release(&self) -> Result<()> {
        Ok(self.registry.release(&self.handle)?)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("handle", &self.handle)
            .field("params", &self.params)
            .field("bos", &self.bos)
            .field("eos", &self.eos)
            .finish()
    }
}

fn special_token(registry: &ResourceRegistry, handle: &Handle, method: &str) -> Result<u32> {
    let data = registry.call_on(handle, method, Params::new())?;
    read_token(&data, "token").ok_or_else(|| malformed(method, "missing token"))
}

/// Read a token id given either bare or wrapped as `{key: id}`.
pub(crate) fn read_token(value: &Value, key: &str) -> Option<u32> {
    let number = match value {
        Value::Object(map) => map.get(key)?,
        other => other,
    };
    number.as_u64().and_then(|n| u32::try_from(n).ok())
}
