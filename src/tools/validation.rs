//! Top-level argument checks against a tool's JSON Schema.

use serde_json::Value;

use super::types::AgentToolParameters;
use crate::error::HelmError;

/// Check `args` against the tool's schema before invoking it.
///
/// Only the top level is inspected: object shape, required keys, declared
/// property types and string enums. Nested schemas are left to the tool.
pub fn check_arguments(args: &Value, parameters: &AgentToolParameters) -> Result<(), HelmError> {
    let schema = &parameters.schema;
    let Some(obj) = args.as_object() else {
        return match schema.get("type").and_then(Value::as_str) {
            Some("object") => Err(violation(format!(
                "expected object arguments, got {}",
                type_name(args)
            ))),
            _ => Ok(()),
        };
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    if let Some(missing) = required.into_iter().find(|name| !obj.contains_key(*name)) {
        return Err(violation(format!("missing required field '{missing}'")));
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        let Some(property) = properties.get(key) else {
            continue;
        };
        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !matches_type(value, expected) {
                return Err(violation(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    type_name(value)
                )));
            }
        }
        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(violation(format!(
                    "field '{key}' must be one of {}",
                    Value::Array(allowed.clone())
                )));
            }
        }
    }
    Ok(())
}

fn violation(message: String) -> HelmError {
    HelmError::InvalidArgument(format!("Argument validation failed: {message}"))
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
