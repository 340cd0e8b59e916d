//! Command records exchanged with the Unity Editor and the per-command
//! parameter shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ErrorCode, McpError, MessageKey};

/// Inclusive bound on every vector component.
pub const VECTOR_BOUND: f64 = 10_000.0;

/// Commands the Editor knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    CreateCube,
    CreateSphere,
    CreateCylinder,
    CreatePlane,
    CreateEmpty,
    DeleteGameobject,
    RefreshAssets,
}

impl CommandType {
    pub const ALL: [CommandType; 7] = [
        Self::CreateCube,
        Self::CreateSphere,
        Self::CreateCylinder,
        Self::CreatePlane,
        Self::CreateEmpty,
        Self::DeleteGameobject,
        Self::RefreshAssets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCube => "create_cube",
            Self::CreateSphere => "create_sphere",
            Self::CreateCylinder => "create_cylinder",
            Self::CreatePlane => "create_plane",
            Self::CreateEmpty => "create_empty",
            Self::DeleteGameobject => "delete_gameobject",
            Self::RefreshAssets => "refresh_assets",
        }
    }

    /// Primitive shape name for `create_*` primitive commands.
    pub fn primitive(&self) -> Option<&'static str> {
        match self {
            Self::CreateCube => Some("cube"),
            Self::CreateSphere => Some("sphere"),
            Self::CreateCylinder => Some("cylinder"),
            Self::CreatePlane => Some("plane"),
            _ => None,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                McpError::new(ErrorCode::UnknownCommandType, MessageKey::UnknownCommandType)
                    .with_param("commandType", s)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vector3 = Vector3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Every component must be finite and within `±VECTOR_BOUND`.
    pub fn validate(&self, field: &str) -> Result<(), McpError> {
        for (axis, value) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if !value.is_finite() {
                return Err(invalid_vector(field, format!("{axis} must be a finite number")));
            }
            if value.abs() > VECTOR_BOUND {
                return Err(invalid_vector(
                    field,
                    format!("{axis}={value} is outside ±{VECTOR_BOUND}"),
                ));
            }
        }
        Ok(())
    }

    /// Parse `{x, y, z}` from a tool argument and validate it.
    pub fn from_value(field: &str, value: &Value) -> Result<Self, McpError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid_vector(field, "expected an object with x, y and z"))?;

        let component = |axis: &str| -> Result<f64, McpError> {
            obj.get(axis)
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid_vector(field, format!("{axis} must be a number")))
        };

        let vector = Self::new(component("x")?, component("y")?, component("z")?);
        vector.validate(field)?;
        Ok(vector)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

fn invalid_vector(field: &str, reason: impl ToString) -> McpError {
    McpError::new(ErrorCode::InvalidVector, MessageKey::InvalidVector)
        .with_param("parameter", field)
        .with_param("reason", reason)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveParams {
    pub name: String,
    pub position: Vector3,
    pub rotation: Vector3,
    pub scale: Vector3,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyParams {
    pub name: String,
    pub position: Vector3,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteParams {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshParams {
    pub force: bool,
}

/// Normalized parameters, one shape per command type.
///
/// Serialized without a tag: the record's `commandType` identifies the shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandParameters {
    Primitive(PrimitiveParams),
    Empty(EmptyParams),
    Delete(DeleteParams),
    Refresh(RefreshParams),
}

impl CommandParameters {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Primitive(p) => Some(&p.name),
            Self::Empty(p) => Some(&p.name),
            Self::Delete(p) => Some(&p.name),
            Self::Refresh(_) => None,
        }
    }
}

/// Validate tool arguments for `command_type` and fill in defaults.
pub fn normalize(command_type: CommandType, args: &Value) -> Result<CommandParameters, McpError> {
    let empty = Map::new();
    let args = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err(McpError::invalid_params("arguments must be an object")),
    };

    let params = match command_type {
        CommandType::CreateCube
        | CommandType::CreateSphere
        | CommandType::CreateCylinder
        | CommandType::CreatePlane => CommandParameters::Primitive(PrimitiveParams {
            name: required_name(args)?,
            position: vector_or(args, "position", Vector3::ZERO)?,
            rotation: vector_or(args, "rotation", Vector3::ZERO)?,
            scale: vector_or(args, "scale", Vector3::ONE)?,
            parent: optional_string(args, "parent")?,
        }),
        CommandType::CreateEmpty => CommandParameters::Empty(EmptyParams {
            name: required_name(args)?,
            position: vector_or(args, "position", Vector3::ZERO)?,
            parent: optional_string(args, "parent")?,
        }),
        CommandType::DeleteGameobject => CommandParameters::Delete(DeleteParams {
            name: required_name(args)?,
        }),
        CommandType::RefreshAssets => CommandParameters::Refresh(RefreshParams {
            force: match args.get("force") {
                None | Some(Value::Null) => false,
                Some(Value::Bool(b)) => *b,
                Some(_) => return Err(McpError::invalid_params("'force' must be a boolean")),
            },
        }),
    };

    Ok(params)
}

fn required_name(args: &Map<String, Value>) -> Result<String, McpError> {
    match args.get("name") {
        None | Some(Value::Null) => Err(McpError::missing_param("name")),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(McpError::invalid_params("'name' must be a non-empty string")),
    }
}

fn optional_string(args: &Map<String, Value>, field: &str) -> Result<Option<String>, McpError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(McpError::invalid_params(format!("'{field}' must be a string"))),
    }
}

fn vector_or(
    args: &Map<String, Value>,
    field: &str,
    default: Vector3,
) -> Result<Vector3, McpError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => Vector3::from_value(field, value),
    }
}

/// Lifecycle of a command record. Only the Editor moves a record past
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Processing")]
    Processing,
    #[serde(alias = "Completed")]
    Completed,
    #[serde(alias = "Failed")]
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Record written by the bridge as `<commandId>.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnityCommand {
    pub command_id: Uuid,
    pub command_type: CommandType,
    pub parameters: CommandParameters,
    pub timestamp: DateTime<Utc>,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl UnityCommand {
    pub fn pending(command_type: CommandType, parameters: CommandParameters) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            command_type,
            parameters,
            timestamp: Utc::now(),
            status: CommandStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.command_id)
    }
}

/// The parts of a command record the bridge reads back.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    pub status: CommandStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CommandRecord {
    /// Editor-supplied error text, ignoring blanks.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileState {
    #[serde(alias = "Idle")]
    Idle,
    #[serde(alias = "Compiling")]
    Compiling,
    #[serde(alias = "Succeeded", alias = "success")]
    Succeeded,
    #[serde(alias = "Failed")]
    Failed,
}

/// Contents of the Editor's `compile-status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStatusRecord {
    pub status: CompileState,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub warnings: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}
