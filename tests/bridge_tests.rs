//! Command bridge against a simulated Editor that picks up command records
//! and writes terminal states back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use unity_mcp_bridge::bridge::{BridgeOptions, CommandType, UnityBridge};
use unity_mcp_bridge::error::ErrorCode;

fn bridge(root: &Path) -> UnityBridge {
    UnityBridge::new(BridgeOptions {
        command_dir: root.join("commands"),
        data_dir: root.to_path_buf(),
        command_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
    })
}

fn command_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Wait for the bridge to drop a command record, as the Editor would.
async fn next_command(dir: &Path) -> (PathBuf, Value) {
    for _ in 0..250 {
        if let Some(path) = command_files(dir).into_iter().next() {
            let record: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            return (path, record);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no command record appeared in {}", dir.display());
}

/// Simulated Editor: take the next record and finish it with `patch`.
fn editor(dir: PathBuf, patch: Value) -> tokio::task::JoinHandle<Value> {
    tokio::spawn(async move {
        let (path, mut record) = next_command(&dir).await;
        let seen = record.clone();
        for (k, v) in patch.as_object().unwrap() {
            record[k] = v.clone();
        }
        fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();
        seen
    })
}

#[tokio::test]
async fn create_cube_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let unity = editor(
        dir.clone(),
        json!({ "status": "completed", "result": { "instanceId": 4242 } }),
    );

    let outcome = bridge
        .submit_str(
            "create_cube",
            &json!({ "name": "TestCube", "position": { "x": 1, "y": 2, "z": 3 } }),
        )
        .await
        .unwrap();

    let seen = unity.await.unwrap();
    assert_eq!(seen["commandType"], "create_cube");
    assert_eq!(seen["status"], "pending");
    assert_eq!(seen["commandId"], outcome.command_id.to_string());
    assert_eq!(seen["parameters"]["scale"], json!({ "x": 1.0, "y": 1.0, "z": 1.0 }));
    assert_eq!(seen["parameters"]["rotation"], json!({ "x": 0.0, "y": 0.0, "z": 0.0 }));

    assert!(outcome.success);
    assert_eq!(outcome.command_type, CommandType::CreateCube);
    assert_eq!(outcome.message, "Created cube 'TestCube' at (1, 2, 3)");
    assert_eq!(outcome.result, Some(json!({ "instanceId": 4242 })));

    let payload = serde_json::to_value(&outcome).unwrap();
    assert_eq!(payload["parameters"]["name"], "TestCube");
    assert_eq!(payload["parameters"]["position"], json!({ "x": 1.0, "y": 2.0, "z": 3.0 }));
    assert!(payload["elapsedMs"].is_u64());

    assert!(command_files(&dir).is_empty(), "terminal record is consumed");
}

#[tokio::test]
async fn unanswered_command_times_out_and_is_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let err = bridge
        .submit_with_timeout(
            CommandType::CreateSphere,
            &json!({ "name": "Ball" }),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Timeout);
    assert!(err.message.contains("create_sphere"), "{}", err.message);
    assert!(err.message.contains("200ms"), "{}", err.message);
    assert!(command_files(&dir).is_empty(), "stale record is removed");
}

#[tokio::test]
async fn editor_failure_carries_its_error_text() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let unity = editor(
        dir.clone(),
        json!({ "status": "failed", "error": "Parent 'Rig' not found" }),
    );
    let err = bridge
        .submit(CommandType::CreateEmpty, &json!({ "name": "Child", "parent": "Rig" }))
        .await
        .unwrap_err();
    let seen = unity.await.unwrap();

    assert_eq!(seen["parameters"]["parent"], "Rig");
    assert_eq!(err.code, ErrorCode::CommandFailed);
    assert_eq!(err.message, "Unity failed to execute create_empty: Parent 'Rig' not found");
    assert!(command_files(&dir).is_empty());
}

#[tokio::test]
async fn completed_with_error_is_a_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());

    let unity = editor(
        tmp.path().join("commands"),
        json!({ "status": "Completed", "error": "GameObject 'Ghost' does not exist" }),
    );
    let err = bridge
        .submit(CommandType::DeleteGameobject, &json!({ "name": "Ghost" }))
        .await
        .unwrap_err();
    unity.await.unwrap();

    assert_eq!(err.code, ErrorCode::CommandFailed);
    assert!(err.message.contains("Ghost"));
}

#[tokio::test]
async fn partial_writes_are_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let unity = tokio::spawn(async move {
        let (path, mut record) = next_command(&dir).await;
        fs::write(&path, "{ \"status\": \"compl").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        record["status"] = json!("completed");
        fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();
    });

    let outcome = bridge
        .submit(CommandType::RefreshAssets, &json!({ "force": true }))
        .await
        .unwrap();
    unity.await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Asset database refreshed (forced)");
}

#[tokio::test]
async fn vanished_record_is_command_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let unity = tokio::spawn(async move {
        let (path, _) = next_command(&dir).await;
        fs::remove_file(path).unwrap();
    });

    let err = bridge
        .submit(CommandType::CreatePlane, &json!({ "name": "Floor" }))
        .await
        .unwrap_err();
    unity.await.unwrap();
    assert_eq!(err.code, ErrorCode::CommandNotFound);
}

#[tokio::test]
async fn invalid_parameters_have_no_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let cases = [
        (
            "create_cube",
            json!({ "name": "Big", "position": { "x": 10001, "y": 0, "z": 0 } }),
            ErrorCode::InvalidVector,
        ),
        (
            "create_cube",
            json!({ "name": "Odd", "scale": { "x": 1, "y": 1 } }),
            ErrorCode::InvalidVector,
        ),
        (
            "create_cube",
            json!({ "position": { "x": 0, "y": 0, "z": 0 } }),
            ErrorCode::MissingParameter,
        ),
        ("create_cube", json!({ "name": "   " }), ErrorCode::InvalidParameters),
        ("create_dragon", json!({ "name": "Smaug" }), ErrorCode::UnknownCommandType),
    ];

    for (command_type, args, code) in cases {
        let err = bridge.submit_str(command_type, &args).await.unwrap_err();
        assert_eq!(err.code, code, "{command_type} {args}");
    }
    assert!(!dir.exists(), "nothing was written");
}

#[tokio::test]
async fn boundary_vector_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());

    let unity = editor(tmp.path().join("commands"), json!({ "status": "completed" }));
    let outcome = bridge
        .submit(
            CommandType::CreateCylinder,
            &json!({ "name": "Edge", "position": { "x": 10000, "y": -10000, "z": 0 } }),
        )
        .await
        .unwrap();
    unity.await.unwrap();
    assert!(outcome.message.contains("(10000, -10000, 0)"), "{}", outcome.message);
}

#[tokio::test]
async fn cancel_pending_stops_waits() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = Arc::new(bridge(tmp.path()));

    let waiting = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge
                .submit(CommandType::CreateCube, &json!({ "name": "Never" }))
                .await
        })
    };

    next_command(&tmp.path().join("commands")).await;
    bridge.cancel_pending();

    let err = waiting.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::Cancelled);
    assert!(command_files(&tmp.path().join("commands")).is_empty());
}

#[tokio::test]
async fn concurrent_submissions_are_independent() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let dir = tmp.path().join("commands");

    let unity = tokio::spawn(async move {
        let mut completed = 0;
        while completed < 2 {
            for path in command_files(&dir) {
                let Ok(raw) = fs::read_to_string(&path) else { continue };
                let Ok(mut record) = serde_json::from_str::<Value>(&raw) else { continue };
                if record["status"] == "pending" {
                    record["status"] = json!("completed");
                    fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();
                    completed += 1;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let args = json!({ "name": "Twin" });
    let (a, b) = tokio::join!(
        bridge.submit(CommandType::CreateCube, &args),
        bridge.submit(CommandType::CreateCube, &args),
    );
    unity.await.unwrap();

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.command_id, b.command_id);
}

#[tokio::test]
async fn compilation_success_consumes_status_file() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    let status = tmp.path().join("compile-status.json");

    fs::write(&status, r#"{ "status": "compiling" }"#).unwrap();
    let writer = {
        let status = status.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let done = r#"{ "status": "succeeded", "warnings": ["obsolete API"] }"#;
            fs::write(&status, done).unwrap();
        })
    };

    let record = bridge.wait_for_compilation(Duration::from_secs(3)).await.unwrap();
    writer.await.unwrap();

    assert_eq!(record.warnings.len(), 1);
    assert!(!status.exists());
}

#[tokio::test]
async fn compilation_failure_reports_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());
    fs::write(
        tmp.path().join("compile-status.json"),
        r#"{ "status": "failed", "errors": ["CS0103 a", "CS1002 b"] }"#,
    )
    .unwrap();

    let err = bridge.wait_for_compilation(Duration::from_secs(3)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CompilationFailed);
    assert_eq!(err.message, "Compilation failed with 2 error(s)");
    assert_eq!(err.context.unwrap()["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn compilation_wait_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path());

    let err = bridge
        .wait_for_compilation(Duration::from_millis(150))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
}
