//! Validation and sandboxed execution of auxiliary command strings.
//!
//! Commands are never handed to a shell. After validation the sanitized
//! string is tokenized and the first token is spawned directly, bounded by a
//! wall-clock timeout and an output limit.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::error::{ErrorCode, McpError, MessageKey};

/// Maximum accepted command length, in characters.
pub const MAX_COMMAND_LENGTH: usize = 1000;
/// Maximum bytes captured per output stream (1 MiB).
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;
const EXECUTION_LOG_CAPACITY: usize = 100;

/// Substrings that reject a command whatever the configuration says.
pub const BUILTIN_BLOCKED_PATTERNS: &[&str] = &[
    ";", "&&", "||", "|", "&", "`", "$(", "${", ">", "<", "\n", "\r",
    "rm -rf", "rm -r", "sudo", "su -", "doas", "chmod", "chown", "mkfs", "dd if=",
    "curl", "wget", "ncat", "nc -", "ssh ", "scp ", "eval", "exec", "shutdown", "reboot",
];

const DEFAULT_ALLOWED_PATHS: &[&str] = &["src", "scripts", "tests", "Assets", "Packages"];

/// Extra punctuation allowed in commands besides ASCII alphanumerics.
const ALLOWED_PUNCTUATION: &str = " -_./:=@,+%~'\"";

/// Sandbox settings. Replaced as a whole through [`ProcessSecurity::update_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    /// Wall-clock limit in milliseconds.
    pub max_execution_time: u64,
    /// Sub-paths of the project root a command may run in.
    pub allowed_paths: Vec<String>,
    /// Case-insensitive substrings rejected in addition to
    /// [`BUILTIN_BLOCKED_PATTERNS`].
    pub blocked_patterns: Vec<String>,
    pub enable_logging: bool,
    pub dry_run: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_execution_time: 30_000,
            allowed_paths: DEFAULT_ALLOWED_PATHS.iter().map(|s| s.to_string()).collect(),
            blocked_patterns: Vec::new(),
            enable_logging: true,
            dry_run: false,
        }
    }
}

/// Family of executables a command may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    Node,
    Npm,
    Git,
    System,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [Self::Node, Self::Npm, Self::Git, Self::System];

    pub fn executables(&self) -> &'static [&'static str] {
        match self {
            Self::Node => &["node"],
            Self::Npm => &["npm", "npx"],
            Self::Git => &["git"],
            Self::System => &["ls", "pwd", "whoami", "date", "uname", "which"],
        }
    }

    /// Infer the kind from the program name.
    pub fn infer(program: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.executables().contains(&program))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "NODE",
            Self::Npm => "NPM",
            Self::Git => "GIT",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NODE" => Ok(Self::Node),
            "NPM" => Ok(Self::Npm),
            "GIT" => Ok(Self::Git),
            "SYSTEM" => Ok(Self::System),
            other => Err(rejected(format!("unsupported command type '{other}'"))),
        }
    }
}

/// Outcome of a successful (or dry-run) execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub success: bool,
    pub command: String,
    pub command_type: CommandKind,
    pub working_directory: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub dry_run: bool,
}

/// One entry of the execution log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub working_directory: String,
    pub dry_run: bool,
    pub outcome: String,
}

/// Command sandbox bound to one project root.
pub struct ProcessSecurity {
    project_root: PathBuf,
    config: RwLock<SecurityConfig>,
    log: Mutex<VecDeque<ExecutionRecord>>,
}

impl ProcessSecurity {
    pub fn new(config: SecurityConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config: RwLock::new(config),
            log: Mutex::new(VecDeque::with_capacity(EXECUTION_LOG_CAPACITY)),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> SecurityConfig {
        self.config.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn update_config(&self, config: SecurityConfig) {
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = config;
    }

    /// Most recent execution attempts, oldest first.
    pub fn execution_log(&self) -> Vec<ExecutionRecord> {
        self.log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Validate, sanitize and run `command`.
    ///
    /// In dry-run mode nothing is spawned and the sanitized command is echoed
    /// as stdout.
    pub async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        declared: Option<CommandKind>,
    ) -> Result<ExecutionOutput, McpError> {
        let config = self.config();
        let sanitized = sanitize_command(command);

        let result = self
            .execute_checked(command, &sanitized, working_dir, declared, &config)
            .await;

        if config.enable_logging {
            let (working_directory, outcome) = match &result {
                Ok(out) => (
                    out.working_directory.clone(),
                    if out.dry_run { "dry_run".to_string() } else { "success".to_string() },
                ),
                Err(err) => (
                    working_dir.map(|p| p.display().to_string()).unwrap_or_else(|| ".".into()),
                    format!("failed [{}]: {}", err.code.as_u16(), err.message),
                ),
            };
            self.record(ExecutionRecord {
                timestamp: Utc::now(),
                command: sanitized,
                working_directory,
                dry_run: config.dry_run,
                outcome,
            });
        }

        result
    }

    async fn execute_checked(
        &self,
        command: &str,
        sanitized: &str,
        working_dir: Option<&Path>,
        declared: Option<CommandKind>,
        config: &SecurityConfig,
    ) -> Result<ExecutionOutput, McpError> {
        validate_command(command, config)?;

        let tokens = tokenize(sanitized);
        let program = tokens.first().ok_or_else(|| rejected("command is empty"))?;
        let kind = resolve_kind(program, declared)?;
        let cwd = self.resolve_working_dir(working_dir, config)?;

        if config.dry_run {
            debug!("dry run: {sanitized} in {}", cwd.display());
            return Ok(ExecutionOutput {
                success: true,
                command: sanitized.to_string(),
                command_type: kind,
                working_directory: cwd.display().to_string(),
                stdout: sanitized.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
                duration_ms: 0,
                dry_run: true,
            });
        }

        let limit = Duration::from_millis(config.max_execution_time);
        let started = Instant::now();
        let (exit_code, stdout, stderr) = run_process(&tokens, &cwd, limit, sanitized).await?;

        Ok(ExecutionOutput {
            success: true,
            command: sanitized.to_string(),
            command_type: kind,
            working_directory: cwd.display().to_string(),
            stdout,
            stderr,
            exit_code,
            duration_ms: started.elapsed().as_millis() as u64,
            dry_run: false,
        })
    }

    /// Resolve `requested` against the project root and check it is an
    /// allowed directory inside it.
    pub fn resolve_working_dir(
        &self,
        requested: Option<&Path>,
        config: &SecurityConfig,
    ) -> Result<PathBuf, McpError> {
        let root = self.project_root.canonicalize().map_err(|e| {
            McpError::internal(format!(
                "project root {} is not accessible: {e}",
                self.project_root.display()
            ))
        })?;

        let candidate = match requested {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => root.join(path),
            None => root.clone(),
        };

        let metadata = std::fs::metadata(&candidate).map_err(|_| {
            rejected(format!("working directory {} does not exist", candidate.display()))
        })?;
        if !metadata.is_dir() {
            return Err(rejected(format!("{} is not a directory", candidate.display())));
        }

        let canonical = candidate
            .canonicalize()
            .map_err(|e| rejected(format!("cannot resolve {}: {e}", candidate.display())))?;

        let relative = canonical
            .strip_prefix(&root)
            .map_err(|_| rejected(format!("{} is outside the project root", canonical.display())))?;

        if relative.as_os_str().is_empty() {
            return Ok(canonical);
        }

        let allowed = config.allowed_paths.iter().any(|allowed| {
            let allowed = allowed.trim_start_matches("./").trim_end_matches('/');
            !allowed.is_empty() && allowed != "." && relative.starts_with(allowed)
        });
        if !allowed {
            return Err(rejected(format!(
                "{} is not in an allowed directory",
                relative.display()
            )));
        }

        Ok(canonical)
    }

    fn record(&self, record: ExecutionRecord) {
        info!(
            target: "process_audit",
            command = %record.command,
            working_directory = %record.working_directory,
            dry_run = record.dry_run,
            outcome = %record.outcome,
            "process execution"
        );
        let mut log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        if log.len() == EXECUTION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(record);
    }
}

fn rejected(reason: impl ToString) -> McpError {
    McpError::new(ErrorCode::CommandRejected, MessageKey::CommandRejected)
        .with_param("reason", reason)
}

/// Reject empty, overlong, blocked or oddly-charactered commands.
pub fn validate_command(command: &str, config: &SecurityConfig) -> Result<(), McpError> {
    if command.trim().is_empty() {
        return Err(rejected("command is empty"));
    }
    if command.chars().count() > MAX_COMMAND_LENGTH {
        return Err(rejected(format!("command exceeds {MAX_COMMAND_LENGTH} characters")));
    }

    let lowered = command.to_lowercase();
    let mut patterns = BUILTIN_BLOCKED_PATTERNS
        .iter()
        .copied()
        .chain(config.blocked_patterns.iter().map(String::as_str));
    if let Some(pattern) =
        patterns.find(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
    {
        return Err(rejected(format!("contains blocked pattern '{}'", pattern.escape_debug()))
            .with_context(json!({ "pattern": pattern })));
    }

    if let Some(c) = command
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !ALLOWED_PUNCTUATION.contains(*c))
    {
        return Err(rejected(format!("contains disallowed character '{}'", c.escape_debug())));
    }

    Ok(())
}

/// Collapse whitespace, normalize quotes to single quotes and truncate.
pub fn sanitize_command(command: &str) -> String {
    let normalized: String = command
        .chars()
        .map(|c| match c {
            '"' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_COMMAND_LENGTH).collect()
}

/// Split on whitespace, keeping single-quoted segments together.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_token = false;

    for c in command.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                has_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }

    tokens
}

fn resolve_kind(program: &str, declared: Option<CommandKind>) -> Result<CommandKind, McpError> {
    match declared {
        Some(kind) if kind.executables().contains(&program) => Ok(kind),
        Some(kind) => Err(rejected(format!(
            "'{program}' is not a {kind} command (allowed: {})",
            kind.executables().join(", ")
        ))),
        None => CommandKind::infer(program)
            .ok_or_else(|| rejected(format!("'{program}' is not an allowed executable"))),
    }
}

async fn read_bounded<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.take(MAX_OUTPUT_BYTES as u64 + 1).read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn run_process(
    tokens: &[String],
    cwd: &Path,
    limit: Duration,
    display: &str,
) -> Result<(Option<i32>, String, String), McpError> {
    let mut child = tokio::process::Command::new(&tokens[0])
        .args(&tokens[1..])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                McpError::new(ErrorCode::CommandNotFound, MessageKey::ProcessNotFound)
                    .with_param("program", &tokens[0])
            }
            std::io::ErrorKind::PermissionDenied => {
                McpError::new(ErrorCode::PermissionDenied, MessageKey::PermissionDenied)
                    .with_param("path", &tokens[0])
            }
            _ => process_failed(format!("cannot start '{}': {e}", tokens[0])),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = tokio::time::timeout(limit, async {
        let (out, err) = tokio::join!(read_bounded(stdout), read_bounded(stderr));
        let (out, err) = (out?, err?);
        if out.len() > MAX_OUTPUT_BYTES || err.len() > MAX_OUTPUT_BYTES {
            return Ok(None);
        }
        let status = child.wait().await?;
        Ok::<_, std::io::Error>(Some((status, out, err)))
    })
    .await;

    match outcome {
        Err(_) => {
            let _ = child.start_kill();
            Err(McpError::new(ErrorCode::Timeout, MessageKey::ProcessTimeout)
                .with_param("timeoutMs", limit.as_millis())
                .with_param("command", display))
        }
        Ok(Err(e)) => {
            let _ = child.start_kill();
            Err(process_failed(format!("I/O error while running '{display}': {e}")))
        }
        Ok(Ok(None)) => {
            let _ = child.start_kill();
            Err(process_failed(format!("output exceeded {MAX_OUTPUT_BYTES} bytes")))
        }
        Ok(Ok(Some((status, out, err)))) => {
            let stdout = String::from_utf8_lossy(&out).into_owned();
            let stderr = String::from_utf8_lossy(&err).into_owned();
            if status.success() {
                Ok((status.code(), stdout, stderr))
            } else {
                Err(process_failed(format!("'{display}' exited with {status}"))
                    .with_context(json!({ "exitCode": status.code(), "stderr": stderr })))
            }
        }
    }
}

fn process_failed(reason: impl ToString) -> McpError {
    McpError::new(ErrorCode::ProcessFailed, MessageKey::ProcessFailed).with_param("reason", reason)
}
