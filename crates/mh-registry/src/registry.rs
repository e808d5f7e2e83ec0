use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{BackendError, RegistryError, Result};
use crate::handle::{Handle, ResourceKind};
use crate::params::Params;
use crate::transport::{method, Transport};

/// A freshly acquired resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    pub handle: Handle,
    /// Everything the backend reported alongside the id.
    pub metadata: Map<String, Value>,
}

/// Maps opaque handles to backend-held resources.
///
/// The registry is a thin request/response boundary: it remembers which
/// handles are live so that calls naming a released handle fail locally, but
/// it holds no reference counts and no inference state.
pub struct ResourceRegistry {
    transport: Arc<dyn Transport>,
    live: Mutex<HashMap<Handle, Map<String, Value>>>,
}

impl ResourceRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            live: Mutex::new(HashMap::new()),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<Handle, Map<String, Value>>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a backend resource and return its handle.
    pub fn acquire(&self, kind: ResourceKind, params: Params) -> Result<Acquired> {
        let method = kind.create_method();
        let data = self.call(method, &params)?;

        let mut metadata = match data {
            Value::Object(map) => map,
            _ => {
                return Err(BackendError::new(format!(
                    "malformed reply from {}: expected an object",
                    method
                ))
                .into())
            }
        };

        let handle = match metadata.remove(kind.id_key()) {
            Some(Value::String(id)) => Handle::new(id, kind),
            Some(Value::Number(id)) => Handle::numeric(&id, kind),
            _ => {
                return Err(BackendError::new(format!(
                    "malformed reply from {}: missing {}",
                    method,
                    kind.id_key()
                ))
                .into())
            }
        };

        debug!(%handle, "acquired backend resource");
        self.live().insert(handle.clone(), metadata.clone());

        Ok(Acquired { handle, metadata })
    }

    /// `acquire` with parameters flattened from a serializable value.
    pub fn acquire_with<T: Serialize + ?Sized>(
        &self,
        kind: ResourceKind,
        params: &T,
    ) -> Result<Acquired> {
        let params = Params::from_serialize(params)?;
        self.acquire(kind, params)
    }

    /// Release a backend resource. The handle is forgotten even when the
    /// backend reports a failure, since the resource can no longer be trusted.
    pub fn release(&self, handle: &Handle) -> Result<()> {
        if self.live().remove(handle).is_none() {
            return Err(RegistryError::UnknownHandle(handle.clone()));
        }

        let params = Params::new()
            .with("kind", handle.kind().as_str())?
            .with(handle.kind().id_key(), handle.wire_id())?;
        self.call(method::RELEASE, &params)?;
        debug!(%handle, "released backend resource");
        Ok(())
    }

    pub fn is_live(&self, handle: &Handle) -> bool {
        self.live().contains_key(handle)
    }

    /// Metadata the backend reported when the handle was acquired.
    pub fn metadata(&self, handle: &Handle) -> Option<Map<String, Value>> {
        self.live().get(handle).cloned()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live().is_empty()
    }

    /// Issue a raw backend call and unwrap its envelope.
    pub fn call(&self, method: &str, params: &Params) -> Result<Value> {
        trace!(method, params = params.len(), "backend call");
        Ok(self.transport.call(method, params).into_result()?)
    }

    /// Issue a backend call on behalf of a live resource. The handle's id is
    /// added to `params` under its kind's id key.
    pub fn call_on(&self, handle: &Handle, method: &str, mut params: Params) -> Result<Value> {
        if !self.is_live(handle) {
            return Err(RegistryError::UnknownHandle(handle.clone()));
        }
        params.insert(handle.kind().id_key(), handle.wire_id())?;
        self.call(method, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Envelope;
    use serde_json::json;

    /// Records every call and answers from a fixed function.
    struct Recording {
        calls: Mutex<Vec<(String, Params)>>,
        reply: fn(&str) -> Envelope,
    }

    impl Recording {
        fn new(reply: fn(&str) -> Envelope) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn calls(&self) -> Vec<(String, Params)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for Recording {
        fn call(&self, method: &str, params: &Params) -> Envelope {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.clone()));
            (self.reply)(method)
        }
    }

    fn happy(method: &str) -> Envelope {
        match method {
            method::CREATE_MODEL => Envelope::ok(json!({ "modelId": 17, "nVocab": 32000 })),
            method::CREATE_CONTEXT => Envelope::ok(json!({ "contextId": "ctx-1" })),
            _ => Envelope::ok(Value::Null),
        }
    }

    #[test]
    fn test_acquire_numeric_id() {
        let transport = Recording::new(happy);
        let registry = ResourceRegistry::new(transport.clone());
        let acquired = registry
            .acquire(ResourceKind::Model, Params::new().with("path", "m.gguf").unwrap())
            .unwrap();
        assert_eq!(acquired.handle.id(), "17");
        assert_eq!(acquired.handle.wire_id(), json!(17));
        assert_eq!(acquired.metadata.get("nVocab"), Some(&json!(32000)));
        assert!(registry.is_live(&acquired.handle));
        assert_eq!(transport.calls()[0].0, method::CREATE_MODEL);
    }

    #[test]
    fn test_acquire_backend_error() {
        let transport = Recording::new(|_| Envelope::err("file not found"));
        let registry = ResourceRegistry::new(transport);
        let err = registry.acquire(ResourceKind::Model, Params::new()).unwrap_err();
        assert!(matches!(&err, RegistryError::Backend(e) if e.message() == "file not found"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_acquire_missing_id() {
        let transport = Recording::new(|_| Envelope::ok(json!({ "workerId": "1" })));
        let registry = ResourceRegistry::new(transport);
        let err = registry.acquire(ResourceKind::Model, Params::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed reply from llm.createModel: missing modelId"
        );
    }

    #[test]
    fn test_serialization_error_never_reaches_backend() {
        let transport = Recording::new(happy);
        let registry = ResourceRegistry::new(transport.clone());
        let err = registry
            .acquire_with(ResourceKind::Context, &json!({ "nested": { "a": 1 } }))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Serialization(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_release_then_call_fails_locally() {
        let transport = Recording::new(happy);
        let registry = ResourceRegistry::new(transport.clone());
        let handle = registry
            .acquire(ResourceKind::Context, Params::new())
            .unwrap()
            .handle;

        registry.release(&handle).unwrap();
        let (method, params) = transport.calls().pop().unwrap();
        assert_eq!(method, method::RELEASE);
        assert_eq!(params.get("contextId"), Some(&json!("ctx-1")));
        assert_eq!(params.get("kind"), Some(&json!("context")));

        let err = registry
            .call_on(&handle, method::TOKENIZE, Params::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownHandle(_)));
        assert!(matches!(
            registry.release(&handle),
            Err(RegistryError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_call_on_injects_id() {
        let transport = Recording::new(happy);
        let registry = ResourceRegistry::new(transport.clone());
        let handle = registry
            .acquire(ResourceKind::Model, Params::new())
            .unwrap()
            .handle;
        registry
            .call_on(&handle, method::TOKEN_BOS, Params::new())
            .unwrap();
        let (method, params) = transport.calls().pop().unwrap();
        assert_eq!(method, method::TOKEN_BOS);
        assert_eq!(params.get("modelId"), Some(&json!(17)));
    }
}
