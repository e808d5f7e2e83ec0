//! In-memory backend used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mh_registry::{method, Envelope, Params, ResourceRegistry, Transport};
use serde_json::{json, Value};

/// Size of the default next-token distribution.
pub const VOCAB: usize = 64;

#[derive(Default)]
struct Script {
    calls: Mutex<Vec<(String, Params)>>,
    failures: Mutex<HashMap<String, String>>,
    steps: Mutex<VecDeque<Envelope>>,
    next_id: AtomicUsize,
}

impl Script {
    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn answer(&self, method: &str, params: &Params) -> Envelope {
        if let Some(message) = self.failures.lock().unwrap().get(method) {
            return Envelope::err(message.clone());
        }

        match method {
            method::CREATE_MODEL => Envelope::ok(json!({ "modelId": self.id("model") })),
            method::CREATE_CONTEXT => Envelope::ok(json!({ "contextId": self.id("ctx") })),
            method::PARSE_GRAMMAR => Envelope::ok(json!({ "grammarId": self.id("grammar") })),
            method::RELEASE => Envelope::ok(Value::Null),
            method::TOKEN_BOS => Envelope::ok(json!({ "token": ScriptedBackend::BOS })),
            method::TOKEN_EOS => Envelope::ok(json!({ "token": ScriptedBackend::EOS })),
            method::TOKEN_NL => Envelope::ok(json!(ScriptedBackend::NL)),
            method::TOKEN_TEXT => {
                let text = match params.get("token").and_then(Value::as_u64) {
                    Some(1) => "<s>".to_string(),
                    Some(2) => "</s>".to_string(),
                    Some(t) => format!("<{}>", t),
                    None => return Envelope::err("token required"),
                };
                Envelope::ok(json!({ "text": text }))
            }
            method::TOKENIZE => {
                let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
                let tokens: Vec<u32> = text.bytes().map(ScriptedBackend::byte_token).collect();
                Envelope::ok(json!({ "tokens": tokens }))
            }
            method::DETOKENIZE => {
                let text: String = params
                    .get("tokens")
                    .and_then(Value::as_array)
                    .map(|tokens| {
                        tokens
                            .iter()
                            .filter_map(Value::as_u64)
                            .filter(|&t| t >= 3 && t < 259)
                            .map(|t| (t - 3) as u8 as char)
                            .collect()
                    })
                    .unwrap_or_default();
                Envelope::ok(json!({ "text": text }))
            }
            method::EVALUATE_STEP => self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Envelope::ok(json!({ "probabilities": default_distribution() }))),
            other => Envelope::err(format!("unknown method {}", other)),
        }
    }
}

impl Transport for Script {
    fn call(&self, method: &str, params: &Params) -> Envelope {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        self.answer(method, params)
    }
}

/// Peaks at `ScriptedBackend::FAVOURITE`, with a runner-up one id above it.
fn default_distribution() -> Vec<f32> {
    let mut probs = vec![0.4 / (VOCAB - 2) as f32; VOCAB];
    probs[ScriptedBackend::FAVOURITE as usize] = 0.5;
    probs[ScriptedBackend::FAVOURITE as usize + 1] = 0.1;
    probs
}

/// A backend that records every call and answers from a small script.
pub struct ScriptedBackend {
    script: Arc<Script>,
    registry: Arc<ResourceRegistry>,
}

impl ScriptedBackend {
    pub const BOS: u32 = 1;
    pub const EOS: u32 = 2;
    pub const NL: u32 = 13;
    pub const FAVOURITE: u32 = 42;

    pub fn new() -> Self {
        let script = Arc::new(Script::default());
        let registry = Arc::new(ResourceRegistry::new(script.clone()));
        Self { script, registry }
    }

    pub fn byte_token(byte: u8) -> u32 {
        byte as u32 + 3
    }

    pub fn registry(&self) -> Arc<ResourceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Make every call to `method` fail with `message`.
    pub fn fail(&self, method: &str, message: &str) {
        self.script
            .failures
            .lock()
            .unwrap()
            .insert(method.to_string(), message.to_string());
    }

    /// Queue a reply for the next `llm.evaluateStep` call.
    pub fn push_step(&self, envelope: Envelope) {
        self.script.steps.lock().unwrap().push_back(envelope);
    }

    /// Queue a step whose distribution puts almost all mass on `token`.
    pub fn push_peak(&self, token: u32) {
        let mut probs = vec![0.01 / VOCAB as f32; VOCAB];
        probs[token as usize] = 0.99;
        self.push_step(Envelope::ok(json!({ "probabilities": probs })));
    }

    pub fn calls(&self) -> Vec<(String, Params)> {
        self.script.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }

    /// Parameters of the most recent call to `method`.
    pub fn last(&self, method: &str) -> Option<Params> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p)
    }
}
