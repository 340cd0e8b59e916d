use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ErrorCode, Language, McpError, MessageKey};
use crate::schema::{validate_value, SchemaValidationError, CONFIG_SCHEMA};
use crate::security::SecurityConfig;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "UNITY_MCP_CONFIG";
/// Environment variable overriding `dataDirectory`.
pub const DATA_PATH_ENV: &str = "UNITY_MCP_DATA_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "./unity-mcp-config.json";

const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_DATA_WAIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Validated server configuration. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    pub mcp_servers: BTreeMap<String, ServerEntry>,
    pub data_directory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_directory: Option<String>,
    pub log_level: LogLevel,
    pub language: Language,
    pub timeouts: Timeouts,
    pub server: ServerIdentity,
    pub unity: UnityWatch,
    pub security: SecurityConfig,
}

/// How a client launches this server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive usable with `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    pub command_timeout: u64,
    pub data_wait_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnityWatch {
    pub auto_detect: bool,
    pub watch_pattern: String,
}

impl ConfigDocument {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_directory)
    }

    /// Directory exchanging command records with the Editor.
    ///
    /// Defaults to `<dataDirectory>/commands`.
    pub fn command_dir(&self) -> PathBuf {
        match &self.command_directory {
            Some(dir) => PathBuf::from(dir),
            None => self.data_dir().join("commands"),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.command_timeout)
    }

    pub fn data_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.data_wait_timeout)
    }
}

/// Default values merged under the user document.
pub fn defaults() -> Value {
    let security = serde_json::to_value(SecurityConfig::default()).unwrap_or_else(|_| json!({}));
    json!({
        "logLevel": "info",
        "language": "en",
        "timeouts": {
            "commandTimeout": DEFAULT_COMMAND_TIMEOUT_MS,
            "dataWaitTimeout": DEFAULT_DATA_WAIT_TIMEOUT_MS
        },
        "server": {
            "name": "unity-mcp-bridge",
            "version": env!("CARGO_PKG_VERSION"),
            "protocolVersion": DEFAULT_PROTOCOL_VERSION
        },
        "unity": {
            "autoDetect": true,
            "watchPattern": "*.json"
        },
        "security": security
    })
}

/// Merge `overlay` into `base` key by key. Overlay values win; nested objects
/// are merged recursively, everything else is replaced.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let nested = value.is_object() && base_map.get(&key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        merge(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Load the configuration file at `path`.
pub fn load(path: &Path) -> Result<ConfigDocument, McpError> {
    load_with_override(path, None)
}

/// Load `path`, replacing `dataDirectory` with `data_dir` when given.
pub fn load_with_override(path: &Path, data_dir: Option<&str>) -> Result<ConfigDocument, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            McpError::new(ErrorCode::ConfigMissing, MessageKey::ConfigMissing)
                .with_param("path", path.display())
        } else {
            McpError::config_invalid(format!("cannot read {}: {e}", path.display()))
        }
    })?;

    let mut value: Value = serde_json::from_str(&raw).map_err(|e| {
        McpError::config_invalid(format!("{} is not valid JSON: {e}", path.display()))
    })?;

    if let (Some(dir), Some(map)) = (data_dir, value.as_object_mut()) {
        debug!("dataDirectory overridden by {DATA_PATH_ENV}: {dir}");
        map.insert("dataDirectory".into(), Value::String(dir.to_string()));
    }

    validate(value)
}

/// Load configuration using the environment.
///
/// - `UNITY_MCP_CONFIG` (optional, default `./unity-mcp-config.json`): config file path
/// - `UNITY_MCP_DATA_PATH` (optional): overrides `dataDirectory`
pub fn load_from_env() -> Result<ConfigDocument, McpError> {
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let data_override = std::env::var(DATA_PATH_ENV).ok().filter(|v| !v.trim().is_empty());

    load_with_override(&path, data_override.as_deref())
}

/// Validate a raw document: schema, then defaults, then business rules.
pub fn validate(value: Value) -> Result<ConfigDocument, McpError> {
    let schema: Value = serde_json::from_str(CONFIG_SCHEMA).map_err(McpError::internal)?;
    validate_value(&schema, &value).map_err(|e| match e {
        SchemaValidationError::ValidationFailed(violations) => {
            McpError::config_invalid(violations.join("; "))
                .with_context(json!({ "violations": violations }))
        }
        other => McpError::internal(other),
    })?;

    let mut merged = defaults();
    merge(&mut merged, value);

    let doc: ConfigDocument = serde_json::from_value(merged).map_err(McpError::config_invalid)?;

    let violations = business_rule_violations(&doc);
    if !violations.is_empty() {
        return Err(McpError::config_invalid(violations.join("; "))
            .with_context(json!({ "violations": violations })));
    }

    Ok(doc)
}

fn business_rule_violations(doc: &ConfigDocument) -> Vec<String> {
    let mut violations = Vec::new();

    let data_dir = doc.data_directory.trim();
    if data_dir.is_empty() {
        violations.push("dataDirectory must not be empty".to_string());
    } else if !is_explicit_path(data_dir) {
        violations.push(format!(
            "dataDirectory '{data_dir}' must be absolute or start with ./ or ../"
        ));
    }

    for (id, entry) in &doc.mcp_servers {
        if !is_valid_server_id(id) {
            violations.push(format!(
                "server id '{id}' must start with a letter and contain only \
                 letters, digits, '_' or '-'"
            ));
        }
        if entry.args.is_empty() {
            violations.push(format!("server '{id}' must declare at least one argument"));
        }
    }

    if doc.timeouts.command_timeout < doc.timeouts.data_wait_timeout {
        violations.push(format!(
            "commandTimeout ({}ms) must be >= dataWaitTimeout ({}ms)",
            doc.timeouts.command_timeout, doc.timeouts.data_wait_timeout
        ));
    }

    if doc.unity.watch_pattern.trim().is_empty() {
        violations.push("unity.watchPattern must not be empty".to_string());
    }

    violations
}

fn is_explicit_path(path: &str) -> bool {
    Path::new(path).is_absolute()
        || path == "."
        || path == ".."
        || ["./", "../", ".\\", "..\\"].iter().any(|p| path.starts_with(p))
}

fn is_valid_server_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_pattern() {
        assert!(is_valid_server_id("unity"));
        assert!(is_valid_server_id("unity-mcp_2"));
        assert!(!is_valid_server_id("2unity"));
        assert!(!is_valid_server_id("_unity"));
        assert!(!is_valid_server_id("unity mcp"));
        assert!(!is_valid_server_id(""));
    }

    #[test]
    fn explicit_paths() {
        assert!(is_explicit_path("/var/unity"));
        assert!(is_explicit_path("./data"));
        assert!(is_explicit_path("../shared/data"));
        assert!(!is_explicit_path("data"));
    }

    #[test]
    fn merge_is_key_by_key() {
        let mut base = json!({ "a": { "x": 1, "y": 2 }, "b": [1, 2] });
        merge(&mut base, json!({ "a": { "y": 3 }, "b": [9] }));
        assert_eq!(base, json!({ "a": { "x": 1, "y": 3 }, "b": [9] }));
    }
}
