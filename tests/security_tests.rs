//! Sandbox: command validation, working directory checks, dry runs and
//! real execution.

use std::fs;
use std::path::Path;

use serde_json::json;

use unity_mcp_bridge::config;
use unity_mcp_bridge::error::ErrorCode;
use unity_mcp_bridge::security::{validate_command, CommandKind, ProcessSecurity, SecurityConfig};

fn sandbox(root: &Path, dry_run: bool) -> ProcessSecurity {
    let config = SecurityConfig {
        dry_run,
        ..SecurityConfig::default()
    };
    ProcessSecurity::new(config, root)
}

#[tokio::test]
async fn dangerous_commands_are_always_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), true);

    let commands = [
        "rm -rf /",
        "npm install && rm package.json",
        "git log | head",
        "node -e `whoami`",
        "sudo ls",
        "SUDO ls",
        "npm run build; reboot",
        "git clone $(cat url)",
    ];

    for command in commands {
        for declared in [None, Some(CommandKind::Node), Some(CommandKind::System)] {
            let err = security.execute(command, None, declared).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::CommandRejected, "{command} with {declared:?}");
        }
    }
}

#[tokio::test]
async fn dry_run_echoes_sanitized_command() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), true);

    let out = security
        .execute("node   --version", None, Some(CommandKind::Node))
        .await
        .unwrap();

    assert!(out.success);
    assert!(out.dry_run);
    assert_eq!(out.command, "node --version");
    assert_eq!(out.stdout, "node --version");
    assert_eq!(out.command_type, CommandKind::Node);
    assert_eq!(out.duration_ms, 0);
}

#[tokio::test]
async fn unknown_or_mismatched_programs_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), true);

    let err = security.execute("python script.py", None, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandRejected);

    let err = security
        .execute("git status", None, Some(CommandKind::Npm))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandRejected);

    let out = security.execute("npx tsc --noEmit", None, None).await.unwrap();
    assert_eq!(out.command_type, CommandKind::Npm);
}

#[test]
fn length_and_character_limits() {
    let config = SecurityConfig::default();
    assert!(validate_command("", &config).is_err());
    assert!(validate_command("   ", &config).is_err());
    assert!(validate_command(&format!("node {}", "a".repeat(1000)), &config).is_err());
    assert!(validate_command("node index.js --port=8080", &config).is_ok());
    assert!(validate_command("node caf\u{e9}.js", &config).is_err());
    assert!(validate_command("git log --format=%H", &config).is_ok());
}

#[test]
fn configured_patterns_extend_the_builtin_list() {
    let doc = config::validate(json!({
        "mcpServers": {
            "unity": { "command": "unity-mcp-bridge", "args": ["--stdio"] }
        },
        "dataDirectory": "./UnityMCP",
        "security": { "blockedPatterns": ["forbidden"] }
    }))
    .unwrap();

    assert!(validate_command("git log --grep=sudo", &doc.security).is_err());
    assert!(validate_command("node forbidden.js", &doc.security).is_err());
    assert!(validate_command("node allowed.js", &doc.security).is_ok());

    let empty = SecurityConfig {
        blocked_patterns: Vec::new(),
        ..SecurityConfig::default()
    };
    assert!(validate_command("npx sudo-prompt", &empty).is_err());
    assert!(validate_command("curl example.com", &empty).is_err());
}

#[tokio::test]
async fn update_config_cannot_lift_builtin_blocks() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), true);
    security.update_config(SecurityConfig {
        blocked_patterns: vec!["nothing".into()],
        dry_run: true,
        ..SecurityConfig::default()
    });

    let err = security.execute("sudo ls", None, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandRejected);
}

#[tokio::test]
async fn working_directory_must_be_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("Assets/Scripts")).unwrap();
    fs::create_dir_all(tmp.path().join("Library")).unwrap();
    fs::write(tmp.path().join("notes.txt"), "x").unwrap();
    let security = sandbox(tmp.path(), true);

    let ok = security
        .execute("git status", Some(Path::new("Assets/Scripts")), None)
        .await
        .unwrap();
    assert!(ok.working_directory.ends_with("Scripts"));

    for dir in ["Library", "missing", "notes.txt", "/"] {
        let err = security
            .execute("git status", Some(Path::new(dir)), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandRejected, "{dir}");
    }

    let root = security.execute("pwd", None, None).await.unwrap();
    assert_eq!(
        Path::new(&root.working_directory),
        tmp.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn execution_log_records_attempts() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), true);

    security.execute("node  --version", None, None).await.unwrap();
    let _ = security.execute("sudo node", None, None).await;

    let log = security.execution_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].command, "node --version");
    assert_eq!(log[0].outcome, "dry_run");
    assert!(log[0].dry_run);
    assert!(log[1].outcome.starts_with("failed [2007]"), "{}", log[1].outcome);
}

#[tokio::test]
async fn logging_can_be_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), true);
    security.update_config(SecurityConfig {
        enable_logging: false,
        dry_run: true,
        ..SecurityConfig::default()
    });
    assert!(!security.config().enable_logging);

    security.execute("node --version", None, None).await.unwrap();
    assert!(security.execution_log().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn real_execution_captures_output() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), false);

    let out = security.execute("pwd", None, None).await.unwrap();
    assert!(!out.dry_run);
    assert_eq!(out.exit_code, Some(0));
    assert_eq!(
        Path::new(out.stdout.trim()).canonicalize().unwrap(),
        tmp.path().canonicalize().unwrap()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn non_zero_exit_is_a_process_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let security = sandbox(tmp.path(), false);

    let err = security
        .execute("ls does-not-exist-anywhere", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProcessFailed);
}
