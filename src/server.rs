use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::handlers;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// Maximum bytes per JSON-RPC message (1 MiB).
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("protocol stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// MCP server that communicates over stdio using newline-delimited JSON-RPC 2.0.
///
/// Requests run concurrently; responses are written as handlers complete.
pub struct McpServer {
    ctx: Arc<AppContext>,
}

impl McpServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Serve stdin/stdout until stdin closes or a termination signal
    /// arrives, then run the cleanup sequence.
    pub async fn run(&self) -> Result<(), ServerError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();

        let outcome = tokio::select! {
            res = self.serve(stdin, &mut stdout) => {
                info!("input closed");
                res
            }
            signal = shutdown_signal() => {
                info!("received {signal}, shutting down");
                Ok(())
            }
        };

        self.ctx.shutdown();
        outcome
    }

    /// Serve one input stream. Returns once the input is exhausted and every
    /// in-flight request has been answered.
    pub async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> Result<(), ServerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut raw = Vec::new();
        let mut in_flight: JoinSet<Option<JsonRpcResponse>> = JoinSet::new();
        let mut eof = false;

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut raw), if !eof => {
                    if read? == 0 {
                        debug!("end of input, {} request(s) in flight", in_flight.len());
                        eof = true;
                        continue;
                    }
                    if let Some(resp) = self.accept(&raw, &mut in_flight) {
                        write_response(writer, &resp).await?;
                    }
                    raw.clear();
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok(Some(resp)) => write_response(writer, &resp).await?,
                        Ok(None) => {}
                        Err(e) => error!("request handler aborted: {e}"),
                    }
                }
                else => break,
            }
        }

        Ok(())
    }

    /// Parse one raw line. Protocol errors are answered immediately; valid
    /// messages are handed to a task.
    fn accept(
        &self,
        raw: &[u8],
        in_flight: &mut JoinSet<Option<JsonRpcResponse>>,
    ) -> Option<JsonRpcResponse> {
        if raw.len() > MAX_MESSAGE_BYTES {
            warn!("message too large: {} bytes (limit {MAX_MESSAGE_BYTES})", raw.len());
            return Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
        }

        let Ok(text) = std::str::from_utf8(raw) else {
            warn!("message is not valid UTF-8");
            return Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                warn!("parse error: {e}");
                return Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
            }
        };

        let req = match classify(value) {
            Ok(req) => req,
            Err(reply) => return reply,
        };

        let ctx = Arc::clone(&self.ctx);
        in_flight.spawn(handle(req, ctx));
        None
    }
}

/// Turn a parsed JSON value into a request, or into the reply owed for a
/// malformed one (`None` when the malformed message carries no id).
fn classify(value: Value) -> Result<JsonRpcRequest, Option<JsonRpcResponse>> {
    let Some(obj) = value.as_object() else {
        warn!("message is not a JSON object");
        return Err(Some(JsonRpcResponse::error(None, JsonRpcError::invalid_request())));
    };

    let id = obj
        .get("id")
        .filter(|v| !v.is_null())
        .map(|v| serde_json::from_value::<RpcId>(v.clone()));
    let id = match id {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => {
            return Err(Some(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request_with("id must be a string or an integer"),
            )));
        }
    };

    let problem = if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        Some("jsonrpc must be \"2.0\"")
    } else if !obj.get("method").and_then(Value::as_str).is_some_and(|m| !m.is_empty()) {
        Some("method must be a non-empty string")
    } else {
        None
    };

    if let Some(problem) = problem {
        return match id {
            Some(id) => Err(Some(JsonRpcResponse::error(
                Some(id),
                JsonRpcError::invalid_request_with(problem),
            ))),
            None => {
                warn!("dropping malformed notification: {problem}");
                Err(None)
            }
        };
    }

    serde_json::from_value(value).map_err(|e| {
        warn!("invalid request: {e}");
        let reply =
            JsonRpcResponse::error(id.clone(), JsonRpcError::invalid_request_with(e.to_string()));
        id.is_some().then_some(reply)
    })
}

async fn handle(req: JsonRpcRequest, ctx: Arc<AppContext>) -> Option<JsonRpcResponse> {
    let outcome = handlers::dispatch(&req, &ctx).await;
    match (req.id, outcome) {
        (None, Ok(_)) => None,
        (None, Err(err)) => {
            err.log();
            None
        }
        (Some(id), Ok(result)) => Some(JsonRpcResponse::success(Some(id), result)),
        (Some(id), Err(err)) => {
            err.log();
            Some(JsonRpcResponse::error(Some(id), JsonRpcError::from_mcp(&err, ctx.language)))
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    resp: &JsonRpcResponse,
) -> Result<(), ServerError> {
    let out = serde_json::to_string(resp)?;
    writer.write_all(out.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!("cannot install SIGTERM handler: {e}");
                ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "Ctrl-C"
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
