use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SerializationError;

/// A flat mapping of primitive values sent with a backend call.
///
/// Values are booleans, numbers, strings, or arrays of those. Nested objects
/// are rejected. `null` means "unset": such keys are omitted entirely, so the
/// backend never sees them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Flatten any serializable value into parameters.
    ///
    /// The value must serialize to a JSON object whose members are all
    /// primitives or arrays of primitives.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, SerializationError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => {
                let mut params = Params::new();
                for (key, value) in map {
                    params.insert(key, value)?;
                }
                Ok(params)
            }
            other => Err(SerializationError::NotAMapping(type_name(&other))),
        }
    }

    /// Insert a parameter, validating that it is flat. Inserting `null`
    /// removes the key.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), SerializationError> {
        let key = key.into();
        let value = value.into();
        check_flat(&key, &value)?;
        if value.is_null() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, value);
        }
        Ok(())
    }

    /// Builder-style `insert`.
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self, SerializationError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as a JSON object string.
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn check_flat(key: &str, value: &Value) -> Result<(), SerializationError> {
    match value {
        Value::Object(_) => Err(SerializationError::NestedObject(key.to_string())),
        Value::Array(items) => {
            if items.iter().any(|v| v.is_array() || v.is_object()) {
                Err(SerializationError::NestedArray(key.to_string()))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct LoadFlags {
        path: String,
        gpu_layers: Option<i32>,
        use_mmap: Option<bool>,
    }

    #[test]
    fn test_from_struct_omits_unset() {
        let params = Params::from_serialize(&LoadFlags {
            path: "model.bin".to_string(),
            gpu_layers: Some(0),
            use_mmap: None,
        })
        .unwrap();
        assert_eq!(params.get("path"), Some(&json!("model.bin")));
        assert_eq!(params.get("gpuLayers"), Some(&json!(0)));
        assert!(!params.contains_key("useMmap"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_arrays_of_primitives_allowed() {
        let params = Params::new().with("history", vec![1u32, 2, 3]).unwrap();
        assert_eq!(params.get("history"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_nested_object_rejected() {
        let err = Params::from_serialize(&json!({ "options": { "seed": 1 } })).unwrap_err();
        assert!(matches!(err, SerializationError::NestedObject(k) if k == "options"));
    }

    #[test]
    fn test_nested_array_rejected() {
        let err = Params::new().with("tokens", json!([[1], [2]])).unwrap_err();
        assert!(matches!(err, SerializationError::NestedArray(_)));
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = Params::from_serialize(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SerializationError::NotAMapping("an array")));
    }

    #[test]
    fn test_null_insert_removes() {
        let mut params = Params::new().with("seed", 3).unwrap();
        params.insert("seed", Value::Null).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_to_json() {
        let params = Params::new().with("text", "root ::= \"a\"").unwrap();
        assert_eq!(params.to_json().unwrap(), r#"{"text":"root ::= \"a\""}"#);
    }
}
