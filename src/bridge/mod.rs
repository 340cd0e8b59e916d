//! File-based command exchange with the Unity Editor.
//!
//! Each mutating tool call becomes one `<commandId>.json` record in the
//! command directory. The bridge writes the record once, in `pending` state,
//! then polls it until the Editor moves it to `completed` or `failed`.

pub mod command;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConfigDocument;
use crate::error::{ErrorCode, McpError, MessageKey};
use crate::monitor::COMPILE_STATUS_FILE;

pub use command::{
    normalize, CommandParameters, CommandRecord, CommandStatus, CommandType, CompileState,
    CompileStatusRecord, UnityCommand, Vector3,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub command_dir: PathBuf,
    pub data_dir: PathBuf,
    pub command_timeout: Duration,
    pub poll_interval: Duration,
}

impl BridgeOptions {
    pub fn from_config(config: &ConfigDocument) -> Self {
        Self {
            command_dir: config.command_dir(),
            data_dir: config.data_dir(),
            command_timeout: config.command_timeout(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Success payload returned once the Editor completes a command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub success: bool,
    pub command_id: Uuid,
    pub command_type: CommandType,
    pub parameters: CommandParameters,
    pub result: Option<Value>,
    pub elapsed_ms: u64,
    pub message: String,
}

/// Submits command records and waits for the Editor to finish them.
///
/// Every wait runs under a child of the bridge's root token, so
/// [`UnityBridge::cancel_pending`] stops all of them at once.
pub struct UnityBridge {
    options: BridgeOptions,
    shutdown: CancellationToken,
}

impl UnityBridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Submit by command type name, rejecting names outside the allow-list.
    pub async fn submit_str(
        &self,
        command_type: &str,
        args: &Value,
    ) -> Result<CommandOutcome, McpError> {
        let command_type: CommandType = command_type.parse()?;
        self.submit(command_type, args).await
    }

    pub async fn submit(
        &self,
        command_type: CommandType,
        args: &Value,
    ) -> Result<CommandOutcome, McpError> {
        self.submit_with_timeout(command_type, args, self.options.command_timeout).await
    }

    pub async fn submit_with_timeout(
        &self,
        command_type: CommandType,
        args: &Value,
        timeout: Duration,
    ) -> Result<CommandOutcome, McpError> {
        let parameters = normalize(command_type, args)?;
        self.ensure_command_dir().await?;

        let command = UnityCommand::pending(command_type, parameters);
        let path = self.options.command_dir.join(command.file_name());
        write_atomic(&path, &command).await?;
        info!("submitted {} ({})", command.command_type, command.command_id);

        let started = Instant::now();
        let record = self.poll_record(&command, &path, timeout).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        remove_quietly(&path).await;

        let error = record.error_text().map(str::to_string);
        match (record.status, error) {
            (CommandStatus::Completed, None) => {
                debug!(
                    "{} ({}) completed in {elapsed_ms}ms",
                    command.command_type, command.command_id
                );
                Ok(CommandOutcome {
                    success: true,
                    command_id: command.command_id,
                    command_type: command.command_type,
                    message: describe(&command.command_type, &command.parameters),
                    parameters: command.parameters,
                    result: record.result,
                    elapsed_ms,
                })
            }
            (_, error) => {
                let error = error
                    .unwrap_or_else(|| "the Editor reported a failure without details".into());
                Err(McpError::new(ErrorCode::CommandFailed, MessageKey::CommandFailed)
                    .with_param("commandType", command.command_type)
                    .with_param("error", error)
                    .with_context(json!({
                        "commandId": command.command_id,
                        "elapsedMs": elapsed_ms,
                        "result": record.result,
                    })))
            }
        }
    }

    /// Wait for the Editor to report the outcome of a script compilation.
    ///
    /// The status file is deleted once a terminal state has been read so the
    /// next compilation starts clean.
    pub async fn wait_for_compilation(
        &self,
        timeout: Duration,
    ) -> Result<CompileStatusRecord, McpError> {
        let path = self.options.data_dir.join(COMPILE_STATUS_FILE);
        let token = self.shutdown.child_token();
        let deadline = tokio::time::sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);
        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(cancelled("wait_for_compilation")),
                _ = &mut deadline => {
                    return Err(McpError::new(ErrorCode::Timeout, MessageKey::CompileTimeout)
                        .with_param("timeoutMs", timeout.as_millis())
                        .with_context(json!({ "path": path.display().to_string() })));
                }
                _ = ticker.tick() => {}
            }

            let Some(status) = read_compile_status(&path).await? else { continue };
            match status.status {
                CompileState::Idle | CompileState::Compiling => continue,
                CompileState::Succeeded => {
                    remove_quietly(&path).await;
                    return Ok(status);
                }
                CompileState::Failed => {
                    remove_quietly(&path).await;
                    let err =
                        McpError::new(ErrorCode::CompilationFailed, MessageKey::CompilationFailed);
                    return Err(err
                        .with_param("errorCount", status.errors.len())
                        .with_context(json!({
                            "errors": status.errors,
                            "warnings": status.warnings,
                        })));
                }
            }
        }
    }

    /// Cancel every in-flight wait. Later waits are cancelled immediately.
    pub fn cancel_pending(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn ensure_command_dir(&self) -> Result<(), McpError> {
        let dir = &self.options.command_dir;
        tokio::fs::create_dir_all(dir).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => permission_denied(dir),
            _ => McpError::new(ErrorCode::ConnectionFailed, MessageKey::CommandDirUnavailable)
                .with_param("path", dir.display())
                .with_param("reason", e),
        })
    }

    async fn poll_record(
        &self,
        command: &UnityCommand,
        path: &Path,
        timeout: Duration,
    ) -> Result<CommandRecord, McpError> {
        let token = self.shutdown.child_token();
        let deadline = tokio::time::sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);
        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    remove_quietly(path).await;
                    return Err(cancelled(command.command_type.as_str()));
                }
                _ = &mut deadline => {
                    warn!(
                        "{} ({}) timed out after {}ms",
                        command.command_type,
                        command.command_id,
                        timeout.as_millis()
                    );
                    remove_quietly(path).await;
                    return Err(McpError::new(ErrorCode::Timeout, MessageKey::CommandTimeout)
                        .with_param("commandType", command.command_type)
                        .with_param("commandId", command.command_id)
                        .with_param("timeoutMs", timeout.as_millis()));
                }
                _ = ticker.tick() => {}
            }

            match read_record(path, command).await? {
                Some(record) if record.status.is_terminal() => return Ok(record),
                _ => {}
            }
        }
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// `Ok(None)` means "not ready yet": the Editor may be mid-rewrite.
async fn read_record(
    path: &Path,
    command: &UnityCommand,
) -> Result<Option<CommandRecord>, McpError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            return match e.kind() {
                ErrorKind::NotFound => Err(McpError::new(
                    ErrorCode::CommandNotFound,
                    MessageKey::CommandNotFound,
                )
                .with_param("commandId", command.command_id)
                .with_context(json!({ "path": path.display().to_string() }))),
                ErrorKind::PermissionDenied => Err(permission_denied(path)),
                _ => {
                    debug!("cannot read {} yet: {e}", path.display());
                    Ok(None)
                }
            };
        }
    };

    match serde_json::from_str::<CommandRecord>(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            debug!("{} is not readable yet: {e}", path.display());
            Ok(None)
        }
    }
}

async fn read_compile_status(path: &Path) -> Result<Option<CompileStatusRecord>, McpError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw).ok()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(permission_denied(path)),
        Err(_) => Ok(None),
    }
}

/// Write to `<path>.tmp` and rename, so the Editor never sees a partial
/// record.
async fn write_atomic(path: &Path, command: &UnityCommand) -> Result<(), McpError> {
    let body = serde_json::to_vec_pretty(command)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = async {
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    result.map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            permission_denied(path)
        } else {
            McpError::new(ErrorCode::ConnectionFailed, MessageKey::CommandDirUnavailable)
                .with_param("path", path.display())
                .with_param("reason", e)
        }
    })
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("cannot remove {}: {e}", path.display());
        }
    }
}

fn permission_denied(path: &Path) -> McpError {
    McpError::new(ErrorCode::PermissionDenied, MessageKey::PermissionDenied)
        .with_param("path", path.display())
}

fn cancelled(operation: &str) -> McpError {
    McpError::new(ErrorCode::Cancelled, MessageKey::Cancelled).with_param("operation", operation)
}

/// One-line summary of a completed command.
fn describe(command_type: &CommandType, parameters: &CommandParameters) -> String {
    match parameters {
        CommandParameters::Primitive(p) => {
            let shape = command_type.primitive().unwrap_or("primitive");
            format!("Created {shape} '{}' at {}", p.name, p.position)
        }
        CommandParameters::Empty(p) => {
            format!("Created empty GameObject '{}' at {}", p.name, p.position)
        }
        CommandParameters::Delete(p) => format!("Deleted GameObject '{}'", p.name),
        CommandParameters::Refresh(p) if p.force => "Asset database refreshed (forced)".to_string(),
        CommandParameters::Refresh(_) => "Asset database refreshed".to_string(),
    }
}
