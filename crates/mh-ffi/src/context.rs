use std::sync::Arc;

use mh_session::{Context, Model, ResourceRegistry};
use tracing::warn;

/// Opaque runtime handle that owns the registry, the loaded model and its
/// evaluation context.
pub struct MhRuntime {
    pub registry: Arc<ResourceRegistry>,
    pub model: Option<Arc<Model>>,
    pub context: Option<Context>,
}

impl MhRuntime {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            model: None,
            context: None,
        }
    }

    /// Release the context and, when `with_model` is set, the model.
    /// Failures are logged, not reported: the handles are gone either way.
    pub fn release(&mut self, with_model: bool) {
        if let Some(context) = self.context.take() {
            if let Err(e) = context.release() {
                warn!(handle = %context.handle(), error = %e, "failed to release context");
            }
        }
        if with_model {
            if let Some(model) = self.model.take() {
                if let Err(e) = model.release() {
                    warn!(handle = %model.handle(), error = %e, "failed to release model");
                }
            }
        }
    }
}

impl Drop for MhRuntime {
    fn drop(&mut self) {
        self.release(true);
    }
}
