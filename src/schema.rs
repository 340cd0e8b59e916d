use jsonschema::validator_for;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SchemaValidationError {
    #[error("Schema parse error: {0}")]
    SchemaParse(#[from] serde_json::Error),
    #[error("Schema compile error: {0}")]
    SchemaCompile(String),
    #[error("Instance validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}

/// Structural schema for the configuration document (draft 2020-12).
///
/// Only shape is checked here; defaults and cross-field rules live in
/// `config`.
pub const CONFIG_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "Unity MCP bridge configuration",
  "type": "object",
  "required": ["mcpServers", "dataDirectory"],
  "properties": {
    "mcpServers": {
      "type": "object",
      "minProperties": 1,
      "additionalProperties": {
        "type": "object",
        "required": ["command", "args"],
        "properties": {
          "command": { "type": "string", "minLength": 1 },
          "args": { "type": "array", "items": { "type": "string" } },
          "cwd": { "type": "string" },
          "env": { "type": "object", "additionalProperties": { "type": "string" } }
        }
      }
    },
    "dataDirectory": { "type": "string", "minLength": 1 },
    "commandDirectory": { "type": "string", "minLength": 1 },
    "logLevel": { "enum": ["error", "warn", "info", "debug", "trace"] },
    "language": { "enum": ["en", "ja"] },
    "timeouts": {
      "type": "object",
      "properties": {
        "commandTimeout": { "type": "integer", "minimum": 1 },
        "dataWaitTimeout": { "type": "integer", "minimum": 1 }
      }
    },
    "server": {
      "type": "object",
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "version": { "type": "string", "minLength": 1 },
        "protocolVersion": { "type": "string", "minLength": 1 }
      }
    },
    "unity": {
      "type": "object",
      "properties": {
        "autoDetect": { "type": "boolean" },
        "watchPattern": { "type": "string" }
      }
    },
    "security": {
      "type": "object",
      "properties": {
        "maxExecutionTime": { "type": "integer", "minimum": 1 },
        "allowedPaths": { "type": "array", "items": { "type": "string" } },
        "blockedPatterns": { "type": "array", "items": { "type": "string" } },
        "enableLogging": { "type": "boolean" },
        "dryRun": { "type": "boolean" }
      }
    }
  }
}"#;

/// Validate a JSON instance against a JSON Schema (draft 2020-12).
/// Returns Ok(()) if valid, Err otherwise.
pub fn validate_json(schema_str: &str, instance_str: &str) -> Result<(), SchemaValidationError> {
    let schema_json: Value = serde_json::from_str(schema_str)?;
    let instance_json: Value = serde_json::from_str(instance_str)?;
    validate_value(&schema_json, &instance_json)
}

/// Validate an already-parsed instance, collecting every violation.
pub fn validate_value(schema: &Value, instance: &Value) -> Result<(), SchemaValidationError> {
    let validator =
        validator_for(schema).map_err(|e| SchemaValidationError::SchemaCompile(e.to_string()))?;

    let violations: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError::ValidationFailed(violations))
    }
}
