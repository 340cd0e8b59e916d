pub mod commands;
pub mod data;
pub mod process;
pub mod tools;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::context::AppContext;
use crate::error::{format_error_response, ErrorCode, McpError, MessageKey};
use crate::protocol::{InitializeParams, JsonRpcRequest, ToolCallParams, ToolResult};

use self::tools::Tool;

/// Dispatch a JSON-RPC message to its method handler.
///
/// The caller decides whether the outcome is written back: results of
/// notifications are dropped.
pub async fn dispatch(req: &JsonRpcRequest, ctx: &AppContext) -> Result<Value, McpError> {
    match req.method.as_str() {
        "initialize" => {
            let params: InitializeParams = req
                .params
                .clone()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            if let Some(client) = &params.client_info {
                info!(
                    "client connected: {} {}",
                    client.name.as_deref().unwrap_or("unknown"),
                    client.version.as_deref().unwrap_or("")
                );
            }
            let server = &ctx.config.server;
            Ok(json!({
                "protocolVersion": server.protocol_version,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": server.name,
                    "version": server.version
                }
            }))
        }

        "notifications/initialized" => {
            debug!("client finished initialization");
            Ok(Value::Null)
        }

        "ping" => Ok(json!({})),

        "tools/list" => Ok(json!({ "tools": tools::definitions() })),

        "tools/call" => {
            let params: ToolCallParams = match &req.params {
                Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                    McpError::invalid_params(format!("invalid tools/call params: {e}"))
                })?,
                None => return Err(McpError::missing_param("name")),
            };
            let result = call_tool(&params, ctx).await?;
            Ok(serde_json::to_value(result)?)
        }

        _ => Err(McpError::new(ErrorCode::MethodNotFound, MessageKey::MethodNotFound)
            .with_param("method", &req.method)),
    }
}

/// Run one tool.
///
/// An unknown tool is an `Err`, nothing runs. Failures of a known tool are
/// reported inside the tool result with `isError` set.
pub async fn call_tool(params: &ToolCallParams, ctx: &AppContext) -> Result<ToolResult, McpError> {
    let tool = Tool::from_name(&params.name).ok_or_else(|| {
        McpError::new(ErrorCode::ToolNotFound, MessageKey::ToolNotFound)
            .with_param("tool", &params.name)
    })?;
    let args = params.arguments.clone().unwrap_or(Value::Null);

    debug!("calling {}", tool.name());
    let outcome = if tool.data_key().is_some() || tool == Tool::AllData {
        data::handle(tool, &args, ctx).await
    } else if tool == Tool::RunCommand {
        process::handle(&args, ctx).await
    } else {
        commands::handle(tool, &args, ctx).await
    };

    Ok(match outcome {
        Ok(value) => ToolResult::json(&value),
        Err(err) => {
            err.log();
            format_error_response(&err, ctx.language)
        }
    })
}
