use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use super::tools::Tool;
use crate::bridge::CommandType;
use crate::context::AppContext;
use crate::error::McpError;

/// Handle a tool that changes Editor state through the command bridge.
pub async fn handle(tool: Tool, args: &Value, ctx: &AppContext) -> Result<Value, McpError> {
    match tool {
        Tool::WaitForCompilation => {
            let timeout = timeout_arg(args)?.unwrap_or_else(|| ctx.config.command_timeout());
            let status = ctx.bridge.wait_for_compilation(timeout).await?;
            Ok(json!({ "success": true, "compilation": status }))
        }
        Tool::RefreshAssets => {
            let wait = match args.get("waitForCompilation") {
                None | Some(Value::Null) => false,
                Some(Value::Bool(b)) => *b,
                Some(_) => {
                    return Err(McpError::invalid_params(
                        "'waitForCompilation' must be a boolean",
                    ))
                }
            };
            // One budget covers the refresh and the compilation wait.
            let timeout = timeout_arg(args)?.unwrap_or_else(|| ctx.config.command_timeout());
            let deadline = Instant::now() + timeout;

            let outcome = ctx
                .bridge
                .submit_with_timeout(CommandType::RefreshAssets, args, timeout)
                .await?;
            let mut value = serde_json::to_value(&outcome)?;
            if wait {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let status = ctx.bridge.wait_for_compilation(remaining).await?;
                value["compilation"] = serde_json::to_value(status)?;
            }
            Ok(value)
        }
        other => {
            let command_type = other.command_type().ok_or_else(|| {
                McpError::internal(format!("{} is not a command tool", other.name()))
            })?;
            let outcome = ctx.bridge.submit(command_type, args).await?;
            Ok(serde_json::to_value(outcome)?)
        }
    }
}

fn timeout_arg(args: &Value) -> Result<Option<Duration>, McpError> {
    match args.get("timeout") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(ms) if ms >= 1 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(McpError::invalid_params(
                "'timeout' must be a positive integer (milliseconds)",
            )),
        },
    }
}
