//! Typed access to tool call arguments.

use serde_json::{Map, Value};

use crate::error::HelmError;

/// Arguments of one tool call. Always a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    /// Wrap a JSON value; anything but an object becomes empty arguments.
    pub fn new(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    pub fn raw(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn require<'a, T>(
        &'a self,
        key: &str,
        kind: &str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, HelmError> {
        self.values
            .get(key)
            .and_then(extract)
            .ok_or_else(|| HelmError::InvalidArgument(format!("Missing {kind} argument: {key}")))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, HelmError> {
        self.require(key, "string", Value::as_str)
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, HelmError> {
        self.require(key, "integer", Value::as_i64)
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, HelmError> {
        self.require(key, "unsigned integer", Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, HelmError> {
        self.require(key, "number", Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, HelmError> {
        self.require(key, "boolean", Value::as_bool)
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<Value>, HelmError> {
        self.require(key, "array", Value::as_array)
    }

    /// Deserialize all arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, HelmError> {
        serde_json::from_value(self.raw()).map_err(|e| {
            HelmError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
