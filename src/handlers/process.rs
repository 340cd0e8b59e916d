use std::path::Path;

use serde_json::Value;

use crate::context::AppContext;
use crate::error::McpError;
use crate::security::CommandKind;

/// Handle `project_run_command`.
pub async fn handle(args: &Value, ctx: &AppContext) -> Result<Value, McpError> {
    let args = args
        .as_object()
        .ok_or_else(|| McpError::missing_param("command"))?;

    let command = match args.get("command") {
        None | Some(Value::Null) => return Err(McpError::missing_param("command")),
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(McpError::invalid_params("'command' must be a string")),
    };

    let working_dir = match args.get("workingDirectory") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(Path::new(s.as_str())),
        Some(_) => return Err(McpError::invalid_params("'workingDirectory' must be a string")),
    };

    let kind = match args.get("commandType") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.parse::<CommandKind>()?),
        Some(_) => return Err(McpError::invalid_params("'commandType' must be a string")),
    };

    let output = ctx.security.execute(command, working_dir, kind).await?;
    Ok(serde_json::to_value(output)?)
}
