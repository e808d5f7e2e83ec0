use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

/// The kind of backend resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Model,
    Context,
    Grammar,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Model => "model",
            ResourceKind::Context => "context",
            ResourceKind::Grammar => "grammar",
        }
    }

    /// Backend method that allocates a resource of this kind.
    pub fn create_method(self) -> &'static str {
        match self {
            ResourceKind::Model => crate::method::CREATE_MODEL,
            ResourceKind::Context => crate::method::CREATE_CONTEXT,
            ResourceKind::Grammar => crate::method::PARSE_GRAMMAR,
        }
    }

    /// Key under which the backend reports, and later expects, the resource id.
    pub fn id_key(self) -> &'static str {
        match self {
            ResourceKind::Model => "modelId",
            ResourceKind::Context => "contextId",
            ResourceKind::Grammar => "grammarId",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a resource held by the backend.
///
/// A handle is a plain value: it carries no destructor authority. Releasing
/// the backend resource is an explicit `ResourceRegistry::release` call.
///
/// The id is kept as text for display and lookup, but remembers whether the
/// backend reported it as a JSON number so it goes back on the wire in the
/// same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    id: String,
    kind: ResourceKind,
    numeric: bool,
}

impl Handle {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            numeric: false,
        }
    }

    /// A handle whose id the backend reported as a number.
    pub fn numeric(id: &Number, kind: ResourceKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            numeric: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The id as the backend expects it back.
    pub fn wire_id(&self) -> Value {
        if self.numeric {
            if let Ok(n) = serde_json::from_str::<Number>(&self.id) {
                return Value::Number(n);
            }
        }
        Value::String(self.id.clone())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
