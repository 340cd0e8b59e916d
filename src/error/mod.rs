//! Numeric error taxonomy shared by every layer.
//!
//! Codes are grouped by leading digit: 1xxx connection/timeout, 2xxx
//! validation, 3xxx execution, 4xxx configuration, 5xxx system. Errors are
//! raised as [`McpError`] and only converted to wire shapes at the protocol
//! boundary.

pub mod messages;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tracing::Level;

pub use messages::{Language, MessageKey};

use crate::protocol::ToolResult;

/// Closed set of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConnectionFailed,
    Timeout,
    InvalidParameters,
    MissingParameter,
    InvalidVector,
    UnknownCommandType,
    ToolNotFound,
    MethodNotFound,
    CommandRejected,
    CommandFailed,
    CommandNotFound,
    PermissionDenied,
    ProcessFailed,
    CompilationFailed,
    ConfigMissing,
    ConfigInvalid,
    Internal,
    Cancelled,
    Unknown,
}

/// Coarse grouping derived from the leading digit of a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Validation,
    Execution,
    Configuration,
    System,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::ConnectionFailed => 1001,
            Self::Timeout => 1002,
            Self::InvalidParameters => 2001,
            Self::MissingParameter => 2002,
            Self::InvalidVector => 2003,
            Self::UnknownCommandType => 2004,
            Self::ToolNotFound => 2005,
            Self::MethodNotFound => 2006,
            Self::CommandRejected => 2007,
            Self::CommandFailed => 3001,
            Self::CommandNotFound => 3002,
            Self::PermissionDenied => 3003,
            Self::ProcessFailed => 3004,
            Self::CompilationFailed => 3005,
            Self::ConfigMissing => 4001,
            Self::ConfigInvalid => 4002,
            Self::Internal => 5001,
            Self::Cancelled => 5002,
            Self::Unknown => 5003,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() / 1000 {
            1 => ErrorCategory::Connection,
            2 => ErrorCategory::Validation,
            3 => ErrorCategory::Execution,
            4 => ErrorCategory::Configuration,
            _ => ErrorCategory::System,
        }
    }

    /// Map to the corresponding JSON-RPC 2.0 error code.
    ///
    /// Unknown tools/methods → -32601, other validation → -32602,
    /// everything else → -32603.
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::ToolNotFound | Self::MethodNotFound => -32601,
            _ if self.category() == ErrorCategory::Validation => -32602,
            _ => -32603,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

/// Error raised anywhere in the bridge.
///
/// `message` is the English rendering made at construction time; use
/// [`McpError::render`] to produce the same message in another language.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
    pub key: Option<MessageKey>,
    pub params: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub context: Option<Value>,
}

impl McpError {
    /// Error whose message is resolved from a template.
    pub fn new(code: ErrorCode, key: MessageKey) -> Self {
        let params = BTreeMap::new();
        Self {
            code,
            message: messages::render(Language::En, key, &params),
            key: Some(key),
            params,
            timestamp: Utc::now(),
            context: None,
        }
    }

    /// Error with a fixed, non-localized message.
    pub fn literal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            key: None,
            params: BTreeMap::new(),
            timestamp: Utc::now(),
            context: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        if let Some(key) = self.key {
            self.message = messages::render(Language::En, key, &self.params);
        }
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn internal(reason: impl ToString) -> Self {
        Self::new(ErrorCode::Internal, MessageKey::Internal).with_param("reason", reason)
    }

    pub fn invalid_params(reason: impl ToString) -> Self {
        Self::new(ErrorCode::InvalidParameters, MessageKey::InvalidParameters)
            .with_param("reason", reason)
    }

    pub fn missing_param(parameter: &str) -> Self {
        Self::new(ErrorCode::MissingParameter, MessageKey::MissingParameter)
            .with_param("parameter", parameter)
    }

    pub fn config_invalid(reason: impl ToString) -> Self {
        Self::new(ErrorCode::ConfigInvalid, MessageKey::ConfigInvalid).with_param("reason", reason)
    }

    /// Re-render the message in `lang` without re-raising.
    pub fn render(&self, lang: Language) -> String {
        match self.key {
            Some(key) => messages::render(lang, key, &self.params),
            None => self.message.clone(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Severity used to route the error to the log.
    pub fn level(&self) -> Level {
        match self.category() {
            ErrorCategory::Validation => Level::WARN,
            ErrorCategory::Execution | ErrorCategory::System => Level::ERROR,
            ErrorCategory::Connection | ErrorCategory::Configuration => Level::INFO,
        }
    }

    pub fn log(&self) {
        let code = self.code.as_u16();
        let context = self.context.as_ref().map(Value::to_string).unwrap_or_default();
        let level = self.level();
        if level == Level::ERROR {
            tracing::error!(code, %context, "{}", self.message);
        } else if level == Level::WARN {
            tracing::warn!(code, %context, "{}", self.message);
        } else {
            tracing::info!(code, %context, "{}", self.message);
        }
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn is_execution(&self) -> bool {
        self.category() == ErrorCategory::Execution
    }

    pub fn is_system(&self) -> bool {
        self.category() == ErrorCategory::System
    }

    /// Structured details carried in tool results and JSON-RPC `error.data`.
    pub fn details(&self, lang: Language) -> Value {
        let mut details = json!({
            "code": self.code,
            "category": self.category(),
            "message": self.render(lang),
            "timestamp": self.timestamp.to_rfc3339(),
        });
        if let Some(context) = &self.context {
            details["context"] = context.clone();
        }
        details
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::new(ErrorCode::PermissionDenied, MessageKey::PermissionDenied)
                    .with_param("path", "(unknown)")
                    .with_context(json!({ "io": err.to_string() }))
            }
            _ => Self::internal(err),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err)
    }
}

fn as_mcp_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a McpError> {
    err.downcast_ref::<McpError>()
}

pub fn is_validation_error(err: &(dyn std::error::Error + 'static)) -> bool {
    as_mcp_error(err).is_some_and(McpError::is_validation)
}

pub fn is_execution_error(err: &(dyn std::error::Error + 'static)) -> bool {
    as_mcp_error(err).is_some_and(McpError::is_execution)
}

/// System errors include anything that is not part of the taxonomy.
pub fn is_system_error(err: &(dyn std::error::Error + 'static)) -> bool {
    as_mcp_error(err).map_or(true, McpError::is_system)
}

/// Turn any error into an `isError` tool result.
///
/// Taxonomy errors additionally carry `errorDetails`.
pub fn format_error_response(
    err: &(dyn std::error::Error + 'static),
    lang: Language,
) -> ToolResult {
    match as_mcp_error(err) {
        Some(mcp) => {
            let text = format!("Error [{}]: {}", mcp.code.as_u16(), mcp.render(lang));
            ToolResult::error(text).with_details(mcp.details(lang))
        }
        None => ToolResult::error(format!("Error: {err}")),
    }
}
