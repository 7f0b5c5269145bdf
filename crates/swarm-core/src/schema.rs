//! Opaque input/output schemas attached to a [`crate::capability::Capability`]
//! (§3 "input/output schema (opaque)"). The engine stores and forwards these
//! as plain JSON Schema documents; it never interprets or validates against
//! them — that is left to the agent that declares the capability.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputSchema {
    pub fn from_json_schema(schema: Value) -> Self {
        Self { schema, description: None }
    }
}

impl OutputSchema {
    pub fn from_json_schema(schema: Value) -> Self {
        Self { schema, description: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schemas_carry_opaque_json_value() {
        let schema = InputSchema::from_json_schema(json!({"type": "object"}));
        assert_eq!(schema.schema["type"], "object");
    }
}
