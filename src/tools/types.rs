//! Tool parameter schemas and results.

use serde::{Deserialize, Serialize};

use crate::types::{user_content_text, UserContent};

/// JSON Schema describing a tool's arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolParameters {
    pub schema: serde_json::Value,
}

impl AgentToolParameters {
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// Object schema with no properties.
    pub fn empty() -> Self {
        Self::object().build()
    }

    /// Start an object schema.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder::default()
    }
}

/// Builder for object parameter schemas.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(
        mut self,
        name: impl Into<String>,
        mut schema: serde_json::Value,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        schema["description"] = serde_json::Value::String(description.into());
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "string" }), description, required)
    }

    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "number" }), description, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "integer" }), description, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "boolean" }), description, required)
    }

    /// String restricted to `values`.
    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "string", "enum": values }),
            description,
            required,
        )
    }

    pub fn build(self) -> AgentToolParameters {
        AgentToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// Output of a tool call (final or partial).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentToolResult {
    /// Content returned to the model.
    pub content: Vec<UserContent>,
    /// Structured data for observers; not sent to the model.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AgentToolResult {
    /// Single text block, empty details.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![UserContent::text(text)],
            details: serde_json::json!({}),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Concatenated text content.
    pub fn text_content(&self) -> String {
        user_content_text(&self.content)
    }
}
