use serde_json::{json, Map, Value};

use super::tools::Tool;
use crate::context::AppContext;
use crate::error::McpError;

/// Handle a read-only data tool.
///
/// Without a watcher the cache is refreshed from disk before every read.
pub async fn handle(tool: Tool, args: &Value, ctx: &AppContext) -> Result<Value, McpError> {
    if !ctx.monitor.is_watching() {
        ctx.monitor.load_all().await;
    }

    match tool {
        Tool::AllData => Ok(all_data(ctx)),
        Tool::CompileStatus => Ok(ctx
            .monitor
            .get("compile_status")
            .unwrap_or_else(|| json!({ "status": "idle", "errors": [], "warnings": [] }))),
        Tool::ConsoleLogs => {
            let limit = parse_limit(args)?;
            let logs = ctx.monitor.wait_for("console_logs", ctx.config.data_wait_timeout()).await?;
            Ok(match limit {
                Some(limit) => truncate_logs(logs, limit),
                None => logs,
            })
        }
        other => {
            let key = other
                .data_key()
                .ok_or_else(|| McpError::internal(format!("{} is not a data tool", other.name())))?;
            ctx.monitor.wait_for(key, ctx.config.data_wait_timeout()).await
        }
    }
}

fn all_data(ctx: &AppContext) -> Value {
    let snapshot = ctx.monitor.get_all();
    let data: Map<String, Value> = snapshot.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut available: Vec<&String> = snapshot.keys().collect();
    available.sort_unstable();
    json!({
        "dataDirectory": ctx.monitor.directory().display().to_string(),
        "available": available,
        "data": data,
    })
}

fn parse_limit(args: &Value) -> Result<Option<usize>, McpError> {
    match args.get("limit") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 => Ok(Some(n as usize)),
            _ => Err(McpError::invalid_params("'limit' must be a positive integer")),
        },
    }
}

/// Keep the `limit` most recent entries. The Editor exports either a bare
/// array or an object with a `logs` array.
fn truncate_logs(mut logs: Value, limit: usize) -> Value {
    let entries = match &mut logs {
        Value::Array(entries) => Some(entries),
        Value::Object(obj) => obj.get_mut("logs").and_then(Value::as_array_mut),
        _ => None,
    };
    if let Some(entries) = entries {
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
    }
    logs
}
