use serde::Serialize;
use serde_json::{json, Value};

use crate::bridge::CommandType;

/// Tools advertised through `tools/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ProjectInfo,
    SceneInfo,
    GameObjects,
    Assets,
    BuildStatus,
    EditorState,
    ConsoleLogs,
    CompileStatus,
    AllData,
    CreateCube,
    CreateSphere,
    CreateCylinder,
    CreatePlane,
    CreateEmpty,
    DeleteGameObject,
    RefreshAssets,
    WaitForCompilation,
    RunCommand,
}

/// Advertised shape of a tool. The input schema is informational only.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl Tool {
    pub const ALL: [Tool; 18] = [
        Self::ProjectInfo,
        Self::SceneInfo,
        Self::GameObjects,
        Self::Assets,
        Self::BuildStatus,
        Self::EditorState,
        Self::ConsoleLogs,
        Self::CompileStatus,
        Self::AllData,
        Self::CreateCube,
        Self::CreateSphere,
        Self::CreateCylinder,
        Self::CreatePlane,
        Self::CreateEmpty,
        Self::DeleteGameObject,
        Self::RefreshAssets,
        Self::WaitForCompilation,
        Self::RunCommand,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProjectInfo => "unity_get_project_info",
            Self::SceneInfo => "unity_get_scene_info",
            Self::GameObjects => "unity_get_gameobjects",
            Self::Assets => "unity_get_assets",
            Self::BuildStatus => "unity_get_build_status",
            Self::EditorState => "unity_get_editor_state",
            Self::ConsoleLogs => "unity_get_console_logs",
            Self::CompileStatus => "unity_get_compile_status",
            Self::AllData => "unity_get_all_data",
            Self::CreateCube => "unity_create_cube",
            Self::CreateSphere => "unity_create_sphere",
            Self::CreateCylinder => "unity_create_cylinder",
            Self::CreatePlane => "unity_create_plane",
            Self::CreateEmpty => "unity_create_empty_gameobject",
            Self::DeleteGameObject => "unity_delete_gameobject",
            Self::RefreshAssets => "unity_refresh_assets",
            Self::WaitForCompilation => "unity_wait_for_compilation",
            Self::RunCommand => "project_run_command",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Cache key read by a data tool.
    pub fn data_key(&self) -> Option<&'static str> {
        match self {
            Self::ProjectInfo => Some("project_info"),
            Self::SceneInfo => Some("scene_info"),
            Self::GameObjects => Some("gameobjects"),
            Self::Assets => Some("assets_info"),
            Self::BuildStatus => Some("build_info"),
            Self::EditorState => Some("editor_state"),
            Self::ConsoleLogs => Some("console_logs"),
            Self::CompileStatus => Some("compile_status"),
            _ => None,
        }
    }

    /// Command record submitted by a mutating tool.
    pub fn command_type(&self) -> Option<CommandType> {
        match self {
            Self::CreateCube => Some(CommandType::CreateCube),
            Self::CreateSphere => Some(CommandType::CreateSphere),
            Self::CreateCylinder => Some(CommandType::CreateCylinder),
            Self::CreatePlane => Some(CommandType::CreatePlane),
            Self::CreateEmpty => Some(CommandType::CreateEmpty),
            Self::DeleteGameObject => Some(CommandType::DeleteGameobject),
            Self::RefreshAssets => Some(CommandType::RefreshAssets),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ProjectInfo => {
                "Get Unity project information (name, Unity version, platform, paths)"
            }
            Self::SceneInfo => "Get the active scene and its loaded scenes",
            Self::GameObjects => "Get the GameObject hierarchy of the active scene",
            Self::Assets => "Get the asset database summary",
            Self::BuildStatus => "Get build settings and the last build result",
            Self::EditorState => "Get the Editor state (play mode, pause, compiling)",
            Self::ConsoleLogs => "Get recent Unity console log entries",
            Self::CompileStatus => "Get the last reported script compilation status",
            Self::AllData => "Get every cached Unity data document at once",
            Self::CreateCube => "Create a cube GameObject in the active scene",
            Self::CreateSphere => "Create a sphere GameObject in the active scene",
            Self::CreateCylinder => "Create a cylinder GameObject in the active scene",
            Self::CreatePlane => "Create a plane GameObject in the active scene",
            Self::CreateEmpty => "Create an empty GameObject in the active scene",
            Self::DeleteGameObject => "Delete a GameObject by name",
            Self::RefreshAssets => {
                "Refresh the asset database, optionally waiting for script compilation"
            }
            Self::WaitForCompilation => "Wait until the Editor finishes compiling scripts",
            Self::RunCommand => {
                "Run an allow-listed project command (node, npm, git, system info) in the sandbox"
            }
        }
    }

    pub fn input_schema(&self) -> Value {
        match self {
            Self::ConsoleLogs => json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Return at most this many of the most recent entries"
                    }
                }
            }),
            Self::CreateCube | Self::CreateSphere | Self::CreateCylinder | Self::CreatePlane => {
                json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string", "description": "GameObject name" },
                        "position": vector_schema("World position (default 0,0,0)"),
                        "rotation": vector_schema("Euler rotation in degrees (default 0,0,0)"),
                        "scale": vector_schema("Local scale (default 1,1,1)"),
                        "parent": {
                            "type": "string",
                            "description": "Name of the parent GameObject"
                        }
                    }
                })
            }
            Self::CreateEmpty => json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string", "description": "GameObject name" },
                    "position": vector_schema("World position (default 0,0,0)"),
                    "parent": { "type": "string", "description": "Name of the parent GameObject" }
                }
            }),
            Self::DeleteGameObject => json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string", "description": "Name of the GameObject to delete" }
                }
            }),
            Self::RefreshAssets => json!({
                "type": "object",
                "properties": {
                    "force": { "type": "boolean", "description": "Force a full reimport" },
                    "waitForCompilation": {
                        "type": "boolean",
                        "description": "Wait for script compilation to finish after the refresh"
                    },
                    "timeout": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Milliseconds shared by the refresh and the compilation wait"
                    }
                }
            }),
            Self::WaitForCompilation => json!({
                "type": "object",
                "properties": { "timeout": timeout_schema() }
            }),
            Self::RunCommand => json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Command line, e.g. \"npm test\""
                    },
                    "workingDirectory": {
                        "type": "string",
                        "description": "Directory relative to the project root"
                    },
                    "commandType": {
                        "type": "string",
                        "enum": ["NODE", "NPM", "GIT", "SYSTEM"]
                    }
                }
            }),
            _ => json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    Tool::ALL.iter().map(Tool::definition).collect()
}

fn vector_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "required": ["x", "y", "z"],
        "properties": {
            "x": { "type": "number" },
            "y": { "type": "number" },
            "z": { "type": "number" }
        }
    })
}

fn timeout_schema() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "description": "Timeout in milliseconds (defaults to the configured command timeout)"
    })
}
